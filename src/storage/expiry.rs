//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims keys that are read again. This task calls
//! [`StorageEngine::cleanup`] on an interval so that keys which are never
//! touched after their deadline are reclaimed too.
//!
//! The interval adapts: a sweep that removes a large share of the keyspace
//! halves it (down to `min_interval`), a sweep that finds nothing doubles it
//! (up to `max_interval`).

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Tuning for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval used for the first sweep (default: 100ms)
    pub base_interval: Duration,
    /// Lower bound for the interval (default: 10ms)
    pub min_interval: Duration,
    /// Upper bound for the interval (default: 1s)
    pub max_interval: Duration,
    /// Share of swept entries above which the sweeper speeds up
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

impl ExpiryConfig {
    /// Computes the next interval from the outcome of one sweep.
    fn next_interval(&self, current: Duration, entries_before: usize, expired: u64) -> Duration {
        if expired == 0 {
            return (current * 2).min(self.max_interval);
        }
        let rate = expired as f64 / entries_before.max(1) as f64;
        if rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else {
            current
        }
    }
}

/// Handle to the running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Background expiry sweeper started");

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the task to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if self.shutdown_tx.send(true).is_ok() {
            debug!("Background expiry sweeper stopped");
        }
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let entries_before = engine.len();
        let expired = engine.cleanup();
        let next = config.next_interval(interval, entries_before, expired);

        if expired > 0 {
            debug!(
                expired,
                remaining = engine.len(),
                interval_ms = next.as_millis() as u64,
                "Expired keys cleaned up"
            );
        } else if next != interval {
            trace!(interval_ms = next.as_millis() as u64, "Sweeper backing off");
        }
        interval = next;
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
