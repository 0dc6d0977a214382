//! Request Handling Module
//!
//! This module implements the API layer for dotkv.
//! It receives parsed HTTP requests, executes them against the store,
//! and returns JSON responses.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  HTTP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   ApiHandler    │  (this module)
//! │                 │
//! │  - Route        │
//! │  - Decode JSON  │
//! │  - Encode JSON  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ KeyValueStore   │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

// Re-export the main request handler
pub use handler::ApiHandler;
