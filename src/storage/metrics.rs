//! Operation counters.
//!
//! Counters are keyed by operation name so they round-trip through the
//! snapshot file unchanged. Each one moves at most once per top-level
//! request, however many keys the request carries.

use std::collections::BTreeMap;
use std::fmt;

/// Operations that have a usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Set,
    Get,
    Delete,
    Search,
}

impl Metric {
    /// The name the counter is stored and queried under.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Set => "Set",
            Metric::Get => "Get",
            Metric::Delete => "Delete",
            Metric::Search => "Search",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter map persisted as the `metrics` section of the snapshot.
pub type Counters = BTreeMap<String, u64>;

/// Bumps `metric` by one, creating it at 1 if it was never recorded.
pub(crate) fn record(counters: &mut Counters, metric: Metric) -> u64 {
    let count = counters.entry(metric.as_str().to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Undoes one `record` of `metric`, dropping the counter if it falls back to 0.
pub(crate) fn revert(counters: &mut Counters, metric: Metric) {
    if let Some(count) = counters.get_mut(metric.as_str()) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counters.remove(metric.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creates_and_increments() {
        let mut counters = Counters::new();
        assert_eq!(record(&mut counters, Metric::Set), 1);
        assert_eq!(record(&mut counters, Metric::Set), 2);
        assert_eq!(record(&mut counters, Metric::Search), 1);

        assert_eq!(counters.get("Set"), Some(&2));
        assert_eq!(counters.get("Search"), Some(&1));
        assert_eq!(counters.get("Get"), None);
    }

    #[test]
    fn test_revert() {
        let mut counters = Counters::new();
        record(&mut counters, Metric::Delete);
        record(&mut counters, Metric::Delete);

        revert(&mut counters, Metric::Delete);
        assert_eq!(counters.get("Delete"), Some(&1));

        revert(&mut counters, Metric::Delete);
        assert_eq!(counters.get("Delete"), None);

        // Never recorded
        revert(&mut counters, Metric::Get);
        assert!(counters.is_empty());
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::Delete.to_string(), "Delete");
        assert_eq!(Metric::Get.as_str(), "Get");
    }
}
