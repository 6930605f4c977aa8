//! Command Handler Module
//!
//! The command processing layer: takes a decoded [`Command`], executes it,
//! and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP decoder   │  (protocol module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └──┬──────┬────┬──┘
//!    │      │    │
//!    ▼      ▼    ▼
//! Storage Config Snapshot
//! ```
//!
//! [`Command`]: crate::protocol::Command

pub mod handler;

pub use handler::{CommandError, CommandHandler, CommandResult};
