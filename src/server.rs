//! TCP Server
//!
//! Owns the listening socket and the accept loop. Every accepted client is
//! served by its own task; all of them are tracked in a [`JoinSet`] so that
//! shutdown can wait for them before the listener is released.
//!
//! Shutdown is driven by a future handed to [`Server::run`]. When it
//! resolves the server stops accepting, raises a `watch` flag that every
//! connection is selecting on, and joins the connection tasks.

use crate::commands::CommandHandler;
use crate::config::{Config, ACCEPT_BACKLOG};
use crate::connection::{handle_connection, FrameMode};
use crate::snapshot::{self, ScanOutcome, SnapshotError};
use crate::storage::StorageEngine;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept` before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A bound, not yet running server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
    mode: FrameMode,
}

impl Server {
    /// Binds the listening socket described by `config`.
    pub async fn bind(config: Arc<Config>, storage: Arc<StorageEngine>) -> io::Result<Self> {
        let listener = bind_listener(&config.bind_address()).await?;
        let mode = if config.pipelining {
            FrameMode::Pipelined
        } else {
            FrameMode::PerRead
        };

        Ok(Self {
            listener,
            handler: CommandHandler::new(storage, config),
            mode,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until `shutdown` resolves, then waits for every
    /// connection task to finish.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let Server {
            listener,
            handler,
            mode,
        } = self;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(client = %addr, "Accepted connection");
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            handler.clone(),
                            mode,
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }

            while let Some(finished) = connections.try_join_next() {
                log_join_error(finished);
            }
        }

        let _ = shutdown_tx.send(true);
        if !connections.is_empty() {
            info!(active = connections.len(), "Waiting for connections to close");
        }
        while let Some(finished) = connections.join_next().await {
            log_join_error(finished);
        }

        drop(listener);
        info!("Server stopped");
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}

/// Creates a listener with address reuse and an explicit backlog.
async fn bind_listener(address: &str) -> io::Result<TcpListener> {
    let addr = lookup_host(address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no usable address for {}", address),
        )
    })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(ACCEPT_BACKLOG)
}

/// Seeds `storage` with the keys of the configured snapshot file.
///
/// A missing file is normal for a fresh server; an unreadable or corrupt
/// one is logged and startup continues with an empty store. Returns the
/// number of keys loaded.
pub async fn load_snapshot(config: &Config, storage: &StorageEngine) -> usize {
    let path = config.snapshot_path();
    let shown = path.display().to_string();

    let scan = match tokio::task::spawn_blocking(move || snapshot::load(path)).await {
        Ok(Ok(scan)) => scan,
        Ok(Err(SnapshotError::Io(e))) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %shown, "No snapshot file, starting empty");
            return 0;
        }
        Ok(Err(e)) => {
            warn!(path = %shown, error = %e, "Ignoring unreadable snapshot");
            return 0;
        }
        Err(e) => {
            error!(error = %e, "Snapshot loading task failed");
            return 0;
        }
    };

    if let ScanOutcome::UnsupportedType(tag) = scan.outcome {
        warn!(path = %shown, value_type = tag, "Snapshot scan stopped at unsupported value type");
    }

    let loaded = storage.load_from_snapshot(scan.records);
    info!(path = %shown, loaded, skipped_expired = scan.expired, "Snapshot loaded");
    loaded
}
