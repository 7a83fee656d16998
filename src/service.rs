// Top-level cycle: fan out every configured (metric, period) aggregation, join them
// under one cycle deadline, publish exactly one snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{info, instrument, warn};

use crate::aggregator::PeriodAggregator;
use crate::error::StatsError;
use crate::models::{MetricQuery, MetricSnapshotEntry, PeriodTable, Snapshot};
use crate::sink::SnapshotPublisher;
use crate::store::SeriesStore;

/// Engine timing settings.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub tz: Tz,
    /// Bound on each single store read.
    pub query_timeout: Duration,
    /// Bound on the whole cycle; unfinished entries are emitted absent.
    pub cycle_deadline: Duration,
}

/// Index pair into the metric list and the period table.
#[derive(Debug, Clone, Copy)]
struct Pair {
    metric: usize,
    period: usize,
}

pub struct EnergyStatsService<S> {
    store: Arc<S>,
    periods: Arc<PeriodTable>,
    metrics: Vec<MetricQuery>,
    pairs: Vec<Pair>,
    config: ServiceConfig,
    publisher: SnapshotPublisher,
}

impl<S: SeriesStore> EnergyStatsService<S> {
    /// Resolves the metric × period pairs once through [`PeriodTable::resolve_pairs`].
    pub fn new(
        store: Arc<S>,
        periods: Arc<PeriodTable>,
        metrics: Vec<MetricQuery>,
        config: ServiceConfig,
        publisher: SnapshotPublisher,
    ) -> Result<Self, StatsError> {
        let pairs = periods
            .resolve_pairs(&metrics)?
            .into_iter()
            .map(|(metric, period)| Pair { metric, period })
            .collect();
        Ok(Self {
            store,
            periods,
            metrics,
            pairs,
            config,
            publisher,
        })
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    /// Number of entries every snapshot carries.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Runs one cycle at `now` and emits its snapshot to the sink.
    ///
    /// Always returns one entry per configured pair, in configuration order, even
    /// when reads fail or the cycle deadline cuts aggregations short.
    #[instrument(skip(self), fields(pairs = self.pairs.len()))]
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Vec<MetricSnapshotEntry> {
        let started = Instant::now();
        let aggregator = PeriodAggregator::new(
            self.store.as_ref(),
            self.config.tz,
            self.config.query_timeout,
        );

        let mut slots: Vec<Option<MetricSnapshotEntry>> = vec![None; self.pairs.len()];
        let mut pending: FuturesUnordered<_> = self
            .pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| {
                let aggregator = &aggregator;
                let metric = &self.metrics[pair.metric];
                let spec = &self.periods.specs()[pair.period];
                async move { (i, aggregator.aggregate(metric, spec, now).await) }
            })
            .collect();

        let deadline = tokio::time::sleep(self.config.cycle_deadline);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((i, entry)) => slots[i] = Some(entry),
                    None => break,
                },
                _ = &mut deadline => {
                    let incomplete: Vec<String> = slots
                        .iter()
                        .zip(&self.pairs)
                        .filter(|(slot, _)| slot.is_none())
                        .map(|(_, pair)| self.pair_label(pair))
                        .collect();
                    warn!(
                        deadline_ms = self.config.cycle_deadline.as_millis() as u64,
                        incomplete = ?incomplete,
                        "cycle deadline exceeded; emitting incomplete entries as absent"
                    );
                    break;
                }
            }
        }
        drop(pending);

        let entries: Vec<MetricSnapshotEntry> = slots
            .into_iter()
            .zip(&self.pairs)
            .map(|(slot, pair)| {
                slot.unwrap_or_else(|| {
                    MetricSnapshotEntry::absent(
                        &self.metrics[pair.metric].id,
                        &self.periods.specs()[pair.period].name,
                    )
                })
            })
            .collect();

        info!(
            entries = entries.len(),
            absent_values = entries.iter().filter(|e| e.current_value.is_none()).count(),
            absent_stats = entries.iter().filter(|e| e.stats.is_none()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stats cycle complete"
        );

        self.publisher.publish(Snapshot {
            generated_at: now,
            entries: entries.clone(),
        });
        entries
    }

    fn pair_label(&self, pair: &Pair) -> String {
        format!(
            "{}/{}",
            self.metrics[pair.metric].id,
            self.periods.specs()[pair.period].name
        )
    }
}
