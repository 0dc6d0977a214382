//! Connection Handler Module
//!
//! This module manages individual client connections to dotkv.
//! Each client connection is handled by its own async task, and each
//! request runs on the blocking pool so snapshot writes never stall
//! the accept loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (serve)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse HTTP  │───>│ ApiHandler  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Keep-Alive**: Connections stay open until the client asks to close
//! - **Pipelining**: Several requests in one TCP packet are answered in order
//! - **Statistics**: Tracks connection and request metrics
//!
//! ## Example
//!
//! ```ignore
//! use dotkv::commands::ApiHandler;
//! use dotkv::connection::{serve, ConnectionStats};
//! use dotkv::storage::KeyValueStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(KeyValueStore::new());
//! let listener = TcpListener::bind("127.0.0.1:4000").await?;
//! serve(listener, ApiHandler::new(store), Arc::new(ConnectionStats::new())).await;
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, serve, ConnectionError, ConnectionHandler, ConnectionStats};
