//! Snapshot Module
//!
//! Read-only support for Redis dump (RDB) files. FlintKV never writes
//! snapshots; it reads them to make previously persisted keys visible,
//! either at startup ([`StorageEngine::load_from_snapshot`]) or on demand
//! for `KEYS *`.
//!
//! Values are skipped, not decoded, and compressed (LZF) strings are not
//! supported.
//!
//! [`StorageEngine::load_from_snapshot`]: crate::storage::StorageEngine::load_from_snapshot

pub mod reader;

pub use reader::{
    load, ScanOutcome, SnapshotError, SnapshotReader, SnapshotRecord, SnapshotResult,
    SnapshotScan,
};
