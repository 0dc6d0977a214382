//! Error types shared by the store and the HTTP layer.
//!
//! Every store failure knows its own HTTP status and the short code that goes
//! into the `{"error": ...}` envelope, so the router never has to guess.

use thiserror::Error;

/// Errors raised while reading or writing the snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The file could not be created, read, written or renamed
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store state could not be encoded or the file could not be decoded
    #[error("snapshot encoding error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors returned by [`KeyValueStore`](crate::storage::KeyValueStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A Set entry had an empty key or an empty value, or a Delete key was empty
    #[error("invalid payload")]
    InvalidPayload,

    /// Get was called with no keys
    #[error("no keys requested")]
    InvalidKeys,

    /// Every key requested by Get was missing or expired
    #[error("none of the requested keys were found")]
    KeysNotFound,

    /// GetMetric was called with an empty name
    #[error("metric name is empty")]
    InvalidMetric,

    /// GetMetric was called for a counter that was never recorded
    #[error("metric '{0}' has not been recorded")]
    MetricNotFound(String),

    /// The mutation was applied in memory but persisting it failed
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl StoreError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            StoreError::InvalidPayload | StoreError::InvalidKeys | StoreError::InvalidMetric => {
                400
            }
            StoreError::KeysNotFound | StoreError::MetricNotFound(_) => 404,
            StoreError::Snapshot(_) => 500,
        }
    }

    /// Code placed in the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidPayload => "Invalid payload",
            StoreError::InvalidKeys => "invalid_keys",
            StoreError::KeysNotFound => "keys_not_found",
            StoreError::InvalidMetric => "invalid_metric",
            StoreError::MetricNotFound(_) => "metric_not_found",
            StoreError::Snapshot(_) => "snapshot_failed",
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StoreError::InvalidPayload.status(), 400);
        assert_eq!(StoreError::InvalidKeys.status(), 400);
        assert_eq!(StoreError::InvalidMetric.status(), 400);
        assert_eq!(StoreError::KeysNotFound.status(), 404);
        assert_eq!(StoreError::MetricNotFound("Set".into()).status(), 404);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(StoreError::from(SnapshotError::from(io)).status(), 500);
    }

    #[test]
    fn test_envelope_codes() {
        assert_eq!(StoreError::InvalidPayload.code(), "Invalid payload");
        assert_eq!(StoreError::KeysNotFound.code(), "keys_not_found");
        assert_eq!(
            StoreError::MetricNotFound("Nope".into()).to_string(),
            "metric 'Nope' has not been recorded"
        );
    }
}
