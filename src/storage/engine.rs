//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the key-value store behind every FlintKV command.
//!
//! ## Design Decisions
//!
//! 1. **Single Lock**: One `Mutex` guards the whole map. Every public
//!    operation takes it for its full body and releases it before returning,
//!    so no socket or file I/O ever happens under the lock.
//! 2. **Lazy Expiry**: `get` removes an expired entry when it observes it.
//! 3. **Active Expiry**: `cleanup` sweeps every expired entry; the
//!    [`ExpirySweeper`](crate::storage::ExpirySweeper) calls it periodically.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │             StorageEngine             │
//! │   Mutex<HashMap<Bytes, Entry>>        │
//! └───────────────────────────────────────┘
//!      ▲            ▲             ▲
//!  connection   connection    ExpirySweeper
//!    task 1       task N
//! ```
//!
//! Operations on the same key are serialized by the lock; the last writer
//! to acquire it wins.

use crate::snapshot::SnapshotRecord;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// Errors raised at the store's write boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key must not be empty")]
    EmptyKey,
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry, expiring `ttl` from now when given.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    /// Checks if this entry has expired as of `now`.
    ///
    /// An entry whose deadline equals `now` counts as expired, so a zero TTL
    /// is never observable.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// The shared key-value store.
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all connection tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use flintkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("alice"), None).unwrap();
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("alice")));
///
/// engine
///     .set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)))
///     .unwrap();
/// assert!(engine.remove(b"session"));
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    data: Mutex<HashMap<Bytes, Entry>>,
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the map. A poisoned lock is recovered: entries are
    /// independent, so a panic mid-operation cannot leave the map torn.
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// This is a full overwrite: a previous TTL is discarded unless `ttl`
    /// supplies a new one.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        let entry = Entry::new(value, ttl);
        self.lock().insert(key, entry);
        Ok(())
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed as a side effect (lazy expiry).
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }

        let mut data = self.lock();
        match data.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
            Some(_) => {}
        }
        data.remove(key);
        None
    }

    /// Deletes a key.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, key: &[u8]) -> bool {
        if key.is_empty() {
            return false;
        }
        self.lock().remove(key).is_some()
    }

    /// Removes every expired entry and returns how many were dropped.
    ///
    /// This is called by the background expiry sweeper.
    pub fn cleanup(&self) -> u64 {
        let now = Instant::now();
        let mut data = self.lock();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        (before - data.len()) as u64
    }

    /// Returns every live key. Expired entries are skipped but left in place.
    pub fn keys(&self) -> Vec<Bytes> {
        let now = Instant::now();
        self.lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Seeds the store with keys read from a snapshot file.
    ///
    /// Values are not carried by snapshot records, so every key is stored
    /// with an empty payload. Records already past their deadline and records
    /// with an empty key are skipped. Returns the number of keys inserted.
    pub fn load_from_snapshot<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = SnapshotRecord>,
    {
        let wall_now = SystemTime::now();
        let now = Instant::now();

        let entries: Vec<(Bytes, Entry)> = records
            .into_iter()
            .filter(|record| !record.key.is_empty())
            .filter_map(|record| {
                let expires_at = match record.expires_at {
                    None => None,
                    Some(at) => match at.duration_since(wall_now) {
                        Ok(left) if !left.is_zero() => Some(now + left),
                        _ => return None,
                    },
                };
                let entry = Entry {
                    value: Bytes::new(),
                    expires_at,
                };
                Some((record.key, entry))
            })
            .collect();

        let inserted = entries.len();
        self.lock().extend(entries);
        inserted
    }

    /// Returns the number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(key: &str, expires_at: Option<SystemTime>) -> SnapshotRecord {
        SnapshotRecord {
            key: Bytes::from(key.to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();
        engine
            .set(Bytes::from("key"), Bytes::from("value"), None)
            .unwrap();
        assert_eq!(engine.get(b"key"), Some(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(b"nonexistent"), None);
        assert_eq!(engine.get(b""), None);
    }

    #[test]
    fn test_empty_key_rejected() {
        let engine = StorageEngine::new();
        assert_eq!(
            engine.set(Bytes::new(), Bytes::from("value"), None),
            Err(StoreError::EmptyKey)
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn test_remove() {
        let engine = StorageEngine::new();
        engine
            .set(Bytes::from("key"), Bytes::from("value"), None)
            .unwrap();

        assert!(engine.remove(b"key"));
        assert!(!engine.remove(b"key"));
        assert!(!engine.remove(b""));
        assert_eq!(engine.get(b"key"), None);
    }

    #[test]
    fn test_zero_ttl_is_never_visible() {
        let engine = StorageEngine::new();
        engine
            .set(Bytes::from("key"), Bytes::from("value"), Some(Duration::ZERO))
            .unwrap();
        assert_eq!(engine.get(b"key"), None);
        // Lazy expiry removed the entry.
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn test_expiry() {
        let engine = StorageEngine::new();
        engine
            .set(
                Bytes::from("key"),
                Bytes::from("value"),
                Some(Duration::from_millis(50)),
            )
            .unwrap();

        assert_eq!(engine.get(b"key"), Some(Bytes::from("value")));
        thread::sleep(Duration::from_millis(80));
        assert_eq!(engine.get(b"key"), None);
    }

    #[test]
    fn test_overwrite_clears_ttl() {
        let engine = StorageEngine::new();
        engine
            .set(
                Bytes::from("key"),
                Bytes::from("v1"),
                Some(Duration::from_millis(30)),
            )
            .unwrap();
        engine.set(Bytes::from("key"), Bytes::from("v2"), None).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.get(b"key"), Some(Bytes::from("v2")));
    }

    #[test]
    fn test_keys_skips_expired_without_removing() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("live"), Bytes::from("1"), None).unwrap();
        engine
            .set(Bytes::from("dead"), Bytes::from("2"), Some(Duration::ZERO))
            .unwrap();

        assert_eq!(engine.keys(), vec![Bytes::from("live")]);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_cleanup() {
        let engine = StorageEngine::new();
        for i in 0..5 {
            engine
                .set(
                    Bytes::from(format!("short{}", i)),
                    Bytes::from("v"),
                    Some(Duration::from_millis(10)),
                )
                .unwrap();
        }
        engine
            .set(Bytes::from("persistent"), Bytes::from("v"), None)
            .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.cleanup(), 5);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.cleanup(), 0);
    }

    #[test]
    fn test_load_from_snapshot() {
        let engine = StorageEngine::new();
        let future = SystemTime::now() + Duration::from_secs(3600);
        let past = SystemTime::now() - Duration::from_secs(3600);

        let inserted = engine.load_from_snapshot(vec![
            record("plain", None),
            record("later", Some(future)),
            record("gone", Some(past)),
            record("", None),
        ]);

        assert_eq!(inserted, 2);
        assert_eq!(engine.get(b"plain"), Some(Bytes::new()));
        assert_eq!(engine.get(b"later"), Some(Bytes::new()));
        assert_eq!(engine.get(b"gone"), None);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..250 {
                        let key = Bytes::from(format!("t{}:k{}", t, i));
                        engine.set(key.clone(), Bytes::from("v"), None).unwrap();
                        assert_eq!(engine.get(&key), Some(Bytes::from("v")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 2000);
    }
}
