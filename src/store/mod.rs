// Storage read interface consumed by the aggregation engine.
// Any backend offering these two reads satisfies the engine; SQLite is the bundled one.

mod snapshots;
mod sqlite;

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::StatsError;
use crate::models::{MetricQuery, RawRow, Sample, TimeRange};

pub use sqlite::SqliteStore;

/// Narrow read-only view of a time-series store.
///
/// Empty results are `Ok(None)` / `Ok(vec![])`; errors are only for transport or
/// store failures. Implementations must be safe to call concurrently.
pub trait SeriesStore: Send + Sync {
    /// Newest usable sample of the metric's series in `[range.start, range.end)`.
    fn latest(
        &self,
        query: &MetricQuery,
        range: TimeRange,
    ) -> impl Future<Output = Result<Option<Sample>, StatsError>> + Send;

    /// Every row of the metric's series in `[range.start, range.end)`, ascending by time.
    fn raw_series(
        &self,
        query: &MetricQuery,
        range: TimeRange,
    ) -> impl Future<Output = Result<Vec<RawRow>, StatsError>> + Send;
}

/// Canonical `k=v,k=v` encoding of a tag set (sorted by key).
pub fn encode_tags(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
