//! FlintKV server binary.
//!
//! Parses flags, loads the snapshot, and serves clients until Ctrl+C.

use anyhow::Context;
use flintkv::server::load_snapshot;
use flintkv::{start_expiry_sweeper, CliAction, Config, Server, StorageEngine};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn print_help() {
    println!(
        r#"
FlintKV - A Small Redis-Compatible Key-Value Server

USAGE:
    flintkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 6379)
        --dir <DIR>            Directory of the snapshot file (default: ./)
        --dbfilename <NAME>    Snapshot file name (default: dump.rdb)
        --pipelining           Buffer partial requests and answer every
                               request in a read
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    flintkv                                        # Start on 127.0.0.1:6379
    flintkv --port 6380                            # Start on port 6380
    flintkv --dir /tmp/redis-files --dbfilename dump.rdb

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=flintkv=debug
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
FlintKV v{}
──────────────────────────────────────────────
Listening on {}
Snapshot file {}

Use Ctrl+C to shutdown gracefully.
"#,
        flintkv::VERSION,
        config.bind_address(),
        config.snapshot_path().display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("FlintKV version {}", flintkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Arc::new(config);
    let storage = Arc::new(StorageEngine::new());
    load_snapshot(&config, &storage).await;

    let sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let server = Server::bind(Arc::clone(&config), Arc::clone(&storage))
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    let addr = server.local_addr().context("listener has no local address")?;
    print_banner(&config);
    info!(%addr, pipelining = config.pipelining, "Ready to accept connections");

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    server.run(shutdown).await;
    sweeper.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
