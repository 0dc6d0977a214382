//! Flat-file snapshots of the whole store.
//!
//! The file is a single JSON object:
//!
//! ```text
//! {
//!   "fake_database":     { "<key>": <value>, ... },
//!   "fake_database_ttl": { "<key>": "<RFC 3339 expiry>", ... },
//!   "metrics":           { "Set": 3, "Get": 7, ... }
//! }
//! ```
//!
//! Every save rewrites the whole file. The new contents go to `<path>.tmp`
//! first and are renamed into place, so readers only ever see a complete
//! snapshot.

use crate::error::SnapshotError;
use crate::storage::metrics::Counters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything the store owns, in its persisted shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    /// Stored values by key
    #[serde(rename = "fake_database", default, deserialize_with = "null_as_default")]
    pub data: BTreeMap<String, Value>,

    /// Expiry instants for keys that have a TTL
    #[serde(rename = "fake_database_ttl", default, deserialize_with = "null_as_default")]
    pub expiry: BTreeMap<String, DateTime<Utc>>,

    /// Operation counters
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: Counters,
}

/// Treats an explicit `null` section the same as a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Location of the snapshot on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot.
    ///
    /// Returns `Ok(None)` when no snapshot has been written yet. A file that
    /// exists but cannot be read or decoded is an error.
    pub fn load(&self) -> Result<Option<StoreState>, SnapshotError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot to restore");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let state: StoreState = serde_json::from_slice(&bytes)?;
        info!(
            path = %self.path.display(),
            keys = state.data.len(),
            expiring = state.expiry.len(),
            "Snapshot restored"
        );
        Ok(Some(state))
    }

    /// Replaces the snapshot with `state`.
    pub fn save(&self, state: &StoreState) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec(state)?;
        let tmp = self.tmp_path();

        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;

        debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            keys = state.data.len(),
            "Snapshot written"
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}
