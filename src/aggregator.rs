// One (metric, period) aggregation end to end.
// Every read is bounded by a timeout; any failure degrades only its own field to absent.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::error::StatsError;
use crate::models::{Boundary, MetricQuery, MetricSnapshotEntry, PeriodSpec, Sample, StatSummary};
use crate::store::SeriesStore;
use crate::{period, sampler, stats};

pub struct PeriodAggregator<'a, S> {
    store: &'a S,
    tz: Tz,
    query_timeout: Duration,
}

impl<'a, S: SeriesStore> PeriodAggregator<'a, S> {
    pub fn new(store: &'a S, tz: Tz, query_timeout: Duration) -> Self {
        Self {
            store,
            tz,
            query_timeout,
        }
    }

    /// Never fails: empty reads and store errors both yield absent fields.
    ///
    /// The live value comes from one `latest` read inside the period's boundary. The
    /// summary, when the period requests one, comes from one `raw_series` read over
    /// the trailing window, bucketed then summarized. Both reads run concurrently.
    pub async fn aggregate(
        &self,
        metric: &MetricQuery,
        spec: &PeriodSpec,
        now: DateTime<Utc>,
    ) -> MetricSnapshotEntry {
        let boundary = period::boundaries(spec, now, self.tz);
        let (latest, stats) = tokio::join!(
            self.read_latest(metric, spec, &boundary),
            self.read_summary(metric, spec, &boundary),
        );
        MetricSnapshotEntry {
            metric_id: metric.id.clone(),
            period_name: spec.name.clone(),
            current_value: latest.map(|s| s.value),
            observed_at: latest.map(|s| s.timestamp),
            stats,
        }
    }

    async fn read_latest(
        &self,
        metric: &MetricQuery,
        spec: &PeriodSpec,
        boundary: &Boundary,
    ) -> Option<Sample> {
        let range = boundary.range();
        if range.is_empty() {
            return None;
        }
        match self.bounded(self.store.latest(metric, range)).await {
            Ok(Some(sample)) => Some(sample),
            Ok(None) => {
                debug!(metric = %metric.id, period = %spec.name, "no value in period");
                None
            }
            Err(e) => {
                warn!(
                    metric = %metric.id,
                    period = %spec.name,
                    read = "latest",
                    error = %e,
                    "store read failed; value absent"
                );
                None
            }
        }
    }

    async fn read_summary(
        &self,
        metric: &MetricQuery,
        spec: &PeriodSpec,
        boundary: &Boundary,
    ) -> Option<StatSummary> {
        let bucket_width = spec.bucket_width?;
        let window = period::trailing_range(spec, boundary, self.tz)?;
        if window.is_empty() {
            return None;
        }
        let rows = match self.bounded(self.store.raw_series(metric, window)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    metric = %metric.id,
                    period = %spec.name,
                    read = "raw_series",
                    error = %e,
                    "store read failed; stats absent"
                );
                return None;
            }
        };

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_sample() {
                Ok(s) => samples.push(s),
                Err(e) => warn!(
                    metric = %metric.id,
                    period = %spec.name,
                    error = %e,
                    "skipping malformed row"
                ),
            }
        }

        let bucketed = sampler::sample(&samples, bucket_width, &window, self.tz);
        if bucketed.is_empty() {
            debug!(metric = %metric.id, period = %spec.name, "no samples in trailing window");
            return None;
        }
        stats::summarize_fields(&sampler::values(&bucketed), &spec.stats)
    }

    async fn bounded<T>(
        &self,
        read: impl Future<Output = Result<T, StatsError>>,
    ) -> Result<T, StatsError> {
        match tokio::time::timeout(self.query_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(StatsError::Timeout(self.query_timeout)),
        }
    }
}
