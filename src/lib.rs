//! # FlintKV - A Small Redis-Compatible Key-Value Server
//!
//! FlintKV speaks enough of the Redis wire protocol (RESP) for `redis-cli`
//! and ordinary client libraries to use it as a string cache with
//! millisecond expiry. It can also read the keys of an existing Redis dump
//! file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             FlintKV                              │
//! │                                                                  │
//! │  ┌──────────┐   ┌────────────┐   ┌────────────────┐              │
//! │  │  Server  │──>│ Connection │──>│ CommandHandler │──┐           │
//! │  │ (accept) │   │  (per task)│   └───────┬────────┘  │           │
//! │  └──────────┘   └─────┬──────┘           │           ▼           │
//! │                       │                  ▼       ┌──────────┐    │
//! │                ┌──────┴─────┐   ┌───────────────┐│ Snapshot │    │
//! │                │ RESP codec │   │ StorageEngine ││ (RDB)    │    │
//! │                └────────────┘   │ Mutex<HashMap>│└──────────┘    │
//! │                                 └───────▲───────┘                │
//! │                                         │                        │
//! │                                 ┌───────┴───────┐                │
//! │                                 │ ExpirySweeper │                │
//! │                                 └───────────────┘                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flintkv::{Config, Server, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = Arc::new(Config::default());
//!     let storage = Arc::new(StorageEngine::new());
//!     let sweeper = flintkv::start_expiry_sweeper(Arc::clone(&storage));
//!
//!     flintkv::server::load_snapshot(&config, &storage).await;
//!     let server = Server::bind(config, storage).await?;
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!
//!     sweeper.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//! - `CONFIG GET parameter`
//! - `KEYS *` (keys of the snapshot file)
//!
//! ## Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: `GET` removes an expired entry it runs into
//! 2. **Active**: a background task periodically sweeps the whole map

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{CliAction, Config};
pub use protocol::{Command, ProtocolError, RespValue};
pub use server::Server;
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// Version of FlintKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
