//! Connection Module
//!
//! One async task per client. The task reads bytes, cuts request frames
//! out of them, runs each command, and writes the reply back.
//!
//! ```text
//!  accept() ──► spawn ──► ConnectionHandler
//!                           │
//!                 ┌─────────┴─────────┐
//!                 │ read ─► decode ─► execute ─► reply
//!                 └───────────────────┘
//!                           │
//!                  shutdown signal / EOF / error
//! ```
//!
//! Every handler watches the server's shutdown flag, so a blocked read is
//! abandoned as soon as shutdown begins.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, FrameMode};
