//! dotkv - A Small HTTP Key-Value Store
//!
//! This is the main entry point for the dotkv server.
//! It restores the store from its snapshot, binds the HTTP listener and
//! serves connections until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use dotkv::commands::ApiHandler;
use dotkv::connection::{serve, ConnectionStats};
use dotkv::storage::{KeyValueStore, SnapshotFile};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Parser, Debug)]
#[command(name = "dotkv", version, about = "A small HTTP key-value store", long_about = None)]
struct Config {
    /// Host to bind to
    #[arg(long, default_value_t = dotkv::DEFAULT_HOST.to_string())]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = dotkv::DEFAULT_PORT)]
    port: u16,

    /// Snapshot file restored at startup and rewritten on every set and delete
    #[arg(long, default_value = dotkv::DEFAULT_DATA_FILE)]
    data_file: PathBuf,

    /// Keep everything in memory and never touch the snapshot file
    #[arg(long, default_value_t = false)]
    ephemeral: bool,
}

impl Config {
    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn open_store(&self) -> anyhow::Result<KeyValueStore> {
        if self.ephemeral {
            info!("Running without a snapshot file");
            return Ok(KeyValueStore::new());
        }

        let snapshot = SnapshotFile::new(&self.data_file);
        KeyValueStore::open(snapshot).with_context(|| {
            format!(
                "failed to restore snapshot from {}",
                self.data_file.display()
            )
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Set up logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = dotkv::VERSION, "Starting dotkv");

    let store = Arc::new(config.open_store().inspect_err(|e| error!("{:#}", e))?);
    info!(keys = store.len(), "Store ready");

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = serve(listener, ApiHandler::new(Arc::clone(&store)), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    info!(
        keys = store.len(),
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        requests = stats.requests_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
