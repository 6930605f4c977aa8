//! Storage Engine Module
//!
//! The shared key-value store and the background task that reclaims
//! expired entries.
//!
//! ## Features
//!
//! - **Single Mutex**: one short-held lock around the map
//! - **TTL Support**: values can carry a millisecond deadline
//! - **Lazy Expiry**: expired keys are dropped when read
//! - **Active Expiry**: the sweeper drops keys nobody reads again
//! - **Snapshot Seeding**: keys found in an RDB file can be loaded at startup
//!
//! ## Example
//!
//! ```
//! use flintkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("alice"), None).unwrap();
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("alice")));
//!
//! engine
//!     .set(Bytes::from("session"), Bytes::from("token123"), Some(Duration::ZERO))
//!     .unwrap();
//! assert_eq!(engine.get(b"session"), None);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StoreError};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
