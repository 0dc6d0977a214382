//! # dotkv - A Small HTTP Key-Value Store
//!
//! dotkv keeps JSON values under string keys in memory and serves them over
//! a plain HTTP/JSON API. Keys can expire, dotted keys can be read back as
//! nested objects, and every mutation is snapshotted to a flat file so the
//! store survives a restart.
//!
//! ## Features
//!
//! - **JSON over HTTP**: `POST /set`, `GET /get`, `POST /delete`, `GET /search`, `GET /metric`
//! - **TTL Support**: Per-key expiry, checked lazily on read
//! - **Dotted Paths**: `a.b` and `a.c` read back as `{"a": {"b": .., "c": ..}}`
//! - **Snapshots**: Full state written to disk on every Set and Delete
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               dotkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│    API      │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   HTTP      │    │               KeyValueStore                  │   │
//! │  │   Parser    │    │   RwLock<{ data, expiry, metrics }>          │   │
//! │  └─────────────┘    └──────────────────────┬───────────────────────┘   │
//! │                                            │ Set / Delete               │
//! │                                            ▼                            │
//! │                                   ┌─────────────────┐                   │
//! │                                   │  SnapshotFile   │                   │
//! │                                   └─────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use dotkv::commands::ApiHandler;
//! use dotkv::connection::{serve, ConnectionStats};
//! use dotkv::storage::{KeyValueStore, SnapshotFile};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Restore the store from its snapshot, if there is one
//!     let store = Arc::new(KeyValueStore::open(SnapshotFile::new("data.txt"))?);
//!
//!     let listener = TcpListener::bind("127.0.0.1:4000").await?;
//!     serve(listener, ApiHandler::new(store), Arc::new(ConnectionStats::new())).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: The key-value store, dotted-path resolution, counters and snapshots
//! - [`protocol`]: HTTP/1.1 request parser and response types
//! - [`commands`]: Routes requests to store operations and encodes JSON
//! - [`connection`]: Client connection management
//! - [`error`]: Store and snapshot error types

pub mod commands;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::ApiHandler;
pub use connection::{handle_connection, serve, ConnectionStats};
pub use error::{SnapshotError, StoreError, StoreResult};
pub use protocol::{HttpRequest, HttpResponse, ParseError, RequestParser};
pub use storage::{KeyValueStore, SnapshotFile};

/// The default port dotkv listens on
pub const DEFAULT_PORT: u16 = 4000;

/// The default host dotkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default snapshot location
pub const DEFAULT_DATA_FILE: &str = "data.txt";

/// Version of dotkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
