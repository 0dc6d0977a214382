//! Thread-Safe Key-Value Store with Expiry Support
//!
//! This module implements the core store behind the HTTP API.
//! It keeps JSON values under string keys, with optional per-key expiry,
//! dotted-path lookups and per-operation counters.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: Data, expiry and counters live in one [`StoreState`] behind a
//!    single `RwLock`, so a key and its expiry always change together.
//! 2. **Lazy Expiry**: Expired keys are filtered when read. Nothing sweeps them
//!    in the background; they stay in memory until overwritten or deleted.
//! 3. **Sorted Keys**: The state is kept in `BTreeMap`s. Search returns the
//!    lexicographically first match and dotted-path merges run in key order.
//! 4. **Synchronous Snapshots**: Set and Delete rewrite the snapshot file while
//!    still holding the write lock, so the file never holds a torn state.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                KeyValueStore                 │
//! │  ┌────────────────────────────────────────┐  │
//! │  │           RwLock<StoreState>           │  │
//! │  │  ┌──────────┐ ┌──────────┐ ┌────────┐  │  │
//! │  │  │   data   │ │  expiry  │ │metrics │  │  │
//! │  │  └──────────┘ └──────────┘ └────────┘  │  │
//! │  └────────────────────────────────────────┘  │
//! │                      │ Set / Delete          │
//! │                      ▼                       │
//! │                SnapshotFile                  │
//! └──────────────────────────────────────────────┘
//! ```

use crate::error::{SnapshotError, StoreError, StoreResult};
use crate::storage::metrics::{self, Metric};
use crate::storage::path;
use crate::storage::snapshot::{SnapshotFile, StoreState};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Bound;
use tracing::{debug, error, trace};

/// One entry of a Set request, echoed back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub key: String,

    #[serde(default)]
    pub value: Value,

    /// Seconds until expiry. Zero means the key never expires.
    #[serde(default)]
    pub ttl: i64,
}

impl SetEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Value>, ttl: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// An entry needs a key and a value that is neither missing nor `""`.
    fn is_valid(&self) -> bool {
        !self.key.is_empty() && !matches!(&self.value, Value::Null) && self.value != ""
    }
}

/// A resolved key and its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Result of a Delete that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The key was live and has been removed
    Deleted(KeyValue),
    /// The key did not exist, or had already expired
    NotFound,
}

/// Result of a Search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The first matching key is live
    Found(KeyValue),
    /// The first matching key has expired; the scan stops there
    Expired(String),
    /// No key contains the keyword
    NoMatch,
}

/// A counter value returned by GetMetric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCount {
    pub metric: String,
    pub count: u64,
}

/// The key-value store.
///
/// Designed to be wrapped in an `Arc` and shared by every connection task.
///
/// # Example
///
/// ```
/// use dotkv::storage::{KeyValueStore, SetEntry};
/// use serde_json::json;
///
/// let store = KeyValueStore::new();
/// store
///     .set(vec![
///         SetEntry::new("user.name", "Ariz", 0),
///         SetEntry::new("user.city", "Pune", 0),
///     ])
///     .unwrap();
///
/// let found = store.get(&["user".to_string()]).unwrap();
/// assert_eq!(found[0].value, json!({"name": "Ariz", "city": "Pune"}));
/// ```
pub struct KeyValueStore {
    state: RwLock<StoreState>,

    /// Where Set and Delete persist the state (None = memory only)
    snapshot: Option<SnapshotFile>,
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("KeyValueStore")
            .field("keys", &state.data.len())
            .field("expiring", &state.expiry.len())
            .field("snapshot", &self.snapshot.as_ref().map(|s| s.path()))
            .finish()
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore {
    /// Creates an empty store that never touches the disk.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot: None,
        }
    }

    /// Creates a store from `snapshot`, restoring its state if the file exists.
    ///
    /// Every later Set and Delete rewrites the same file.
    pub fn open(snapshot: SnapshotFile) -> Result<Self, SnapshotError> {
        let state = snapshot.load()?.unwrap_or_default();
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(snapshot),
        })
    }

    /// Stores every entry, replacing existing values.
    ///
    /// A non-zero `ttl` sets the expiry to now + `ttl` seconds; a zero `ttl`
    /// clears any earlier expiry. Entries are validated before anything is
    /// written, so a bad entry leaves the store untouched.
    ///
    /// If the snapshot cannot be written the entries stay applied in memory,
    /// the call is not counted, and `StoreError::Snapshot` is returned; the
    /// next mutation retries the write.
    pub fn set(&self, entries: Vec<SetEntry>) -> StoreResult<Vec<SetEntry>> {
        let now = Utc::now();

        let mut expiries = Vec::with_capacity(entries.len());
        for entry in &entries {
            if !entry.is_valid() {
                return Err(StoreError::InvalidPayload);
            }
            expiries.push(expiry_at(now, entry.ttl)?);
        }

        let mut state = self.state.write();
        for (entry, expires_at) in entries.iter().zip(expiries) {
            state.data.insert(entry.key.clone(), entry.value.clone());
            match expires_at {
                Some(at) => {
                    state.expiry.insert(entry.key.clone(), at);
                }
                None => {
                    state.expiry.remove(&entry.key);
                }
            }
        }
        metrics::record(&mut state.metrics, Metric::Set);
        debug!(entries = entries.len(), "Set applied");

        if let Err(e) = self.persist(&state) {
            metrics::revert(&mut state.metrics, Metric::Set);
            return Err(e);
        }
        Ok(entries)
    }

    /// Looks up each key, exactly or as a dotted-path prefix.
    ///
    /// Misses are dropped from the result. Fails with `KeysNotFound` only when
    /// every key missed; the Get counter moves only when something was found.
    pub fn get(&self, keys: &[String]) -> StoreResult<Vec<KeyValue>> {
        if keys.is_empty() {
            return Err(StoreError::InvalidKeys);
        }

        let now = Utc::now();
        let found: Vec<KeyValue> = {
            let state = self.state.read();
            keys.iter()
                .filter_map(|key| {
                    resolve(&state, key, now).map(|value| KeyValue::new(key.clone(), value))
                })
                .collect()
        };

        if found.is_empty() {
            debug!(requested = keys.len(), "No requested key was found");
            return Err(StoreError::KeysNotFound);
        }

        metrics::record(&mut self.state.write().metrics, Metric::Get);
        Ok(found)
    }

    /// Removes `key` and its expiry.
    ///
    /// A missing key is not an error. An expired key is reclaimed but
    /// reported as not found, and does not count as a Delete. If the
    /// snapshot cannot be written the key is put back, so the Delete can
    /// be retried.
    pub fn delete(&self, key: &str) -> StoreResult<DeleteOutcome> {
        if key.is_empty() {
            return Err(StoreError::InvalidPayload);
        }

        let now = Utc::now();
        let mut state = self.state.write();

        let Some(value) = state.data.remove(key) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let expires_at = state.expiry.remove(key);
        let expired = expires_at.is_some_and(|at| now >= at);

        if !expired {
            metrics::record(&mut state.metrics, Metric::Delete);
        }

        if let Err(e) = self.persist(&state) {
            if !expired {
                metrics::revert(&mut state.metrics, Metric::Delete);
            }
            state.data.insert(key.to_string(), value);
            if let Some(at) = expires_at {
                state.expiry.insert(key.to_string(), at);
            }
            return Err(e);
        }

        if expired {
            trace!(key = key, "Reclaimed expired key on delete");
            return Ok(DeleteOutcome::NotFound);
        }
        Ok(DeleteOutcome::Deleted(KeyValue::new(key, value)))
    }

    /// Finds the first key, in lexicographic order, containing `keyword`.
    ///
    /// If that key has expired the search reports it as expired instead of
    /// moving on to the next match. The Search counter only moves when
    /// nothing matches at all.
    pub fn search(&self, keyword: &str) -> SearchOutcome {
        let now = Utc::now();
        {
            let state = self.state.read();
            if let Some((key, value)) = state.data.iter().find(|(k, _)| k.contains(keyword)) {
                if is_expired(&state, key, now) {
                    trace!(key = %key, "First search match has expired");
                    return SearchOutcome::Expired(key.clone());
                }
                return SearchOutcome::Found(KeyValue::new(key.clone(), value.clone()));
            }
        }

        metrics::record(&mut self.state.write().metrics, Metric::Search);
        SearchOutcome::NoMatch
    }

    /// Returns the counter recorded under `name`.
    pub fn metric(&self, name: &str) -> StoreResult<MetricCount> {
        if name.is_empty() {
            return Err(StoreError::InvalidMetric);
        }

        let state = self.state.read();
        state
            .metrics
            .get(name)
            .map(|&count| MetricCount {
                metric: name.to_string(),
                count,
            })
            .ok_or_else(|| StoreError::MetricNotFound(name.to_string()))
    }

    /// Number of stored keys, expired ones included.
    pub fn len(&self) -> usize {
        self.state.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent copy of the whole state.
    pub fn state(&self) -> StoreState {
        self.state.read().clone()
    }

    /// Writes the snapshot, if one is configured.
    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };

        snapshot.save(state).map_err(|e| {
            error!(path = %snapshot.path().display(), error = %e, "Failed to write snapshot");
            StoreError::from(e)
        })
    }
}

/// Expiry instant for a ttl in seconds; `None` when the key should not expire.
fn expiry_at(now: DateTime<Utc>, ttl: i64) -> StoreResult<Option<DateTime<Utc>>> {
    if ttl == 0 {
        return Ok(None);
    }
    TimeDelta::try_seconds(ttl)
        .and_then(|delta| now.checked_add_signed(delta))
        .map(Some)
        .ok_or(StoreError::InvalidPayload)
}

#[inline]
fn is_expired(state: &StoreState, key: &str, now: DateTime<Utc>) -> bool {
    state.expiry.get(key).is_some_and(|&at| now >= at)
}

/// Resolves one requested key: an exact live match first, otherwise the
/// object built from live `<key>.<rest>` entries.
fn resolve(state: &StoreState, key: &str, now: DateTime<Utc>) -> Option<Value> {
    if let Some(value) = state.data.get(key) {
        if is_expired(state, key, now) {
            trace!(key = key, "Key is expired");
            return None;
        }
        return Some(value.clone());
    }

    let prefix = format!("{key}.");
    let children = state
        .data
        .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(&prefix))
        .filter(|(k, _)| !is_expired(state, k, now))
        .map(|(k, v)| (k.as_str(), v));

    path::synthesize(key, children)
}
