//! Storage Module
//!
//! This module provides the core storage functionality for dotkv:
//! a thread-safe key-value store with lazy TTL expiry, dotted-path
//! lookups, operation counters and flat-file snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               KeyValueStore                 │
//! │   RwLock<StoreState { data, expiry,         │
//! │                       metrics }>            │
//! └──────────────┬───────────────────┬──────────┘
//!                │ Get               │ Set / Delete
//!                ▼                   ▼
//!        ┌──────────────┐    ┌──────────────┐
//!        │ path         │    │ SnapshotFile │
//!        │ (a.b -> {b}) │    │ (data.txt)   │
//!        └──────────────┘    └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use dotkv::storage::{KeyValueStore, SetEntry, SearchOutcome};
//! use serde_json::json;
//!
//! let store = KeyValueStore::new();
//!
//! // Basic operations
//! store.set(vec![SetEntry::new("name", "Ariz", 0)]).unwrap();
//! let found = store.get(&["name".to_string()]).unwrap();
//! assert_eq!(found[0].value, json!("Ariz"));
//!
//! // Set with a one hour TTL
//! store.set(vec![SetEntry::new("session", "token123", 3600)]).unwrap();
//!
//! assert!(matches!(store.search("sess"), SearchOutcome::Found(_)));
//! ```

pub mod engine;
pub mod metrics;
pub mod path;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{DeleteOutcome, KeyValue, KeyValueStore, MetricCount, SearchOutcome, SetEntry};
pub use metrics::Metric;
pub use snapshot::{SnapshotFile, StoreState};
