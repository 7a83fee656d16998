// Shared test helpers: an in-memory store with injectable failures and delays.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use homestats::error::StatsError;
use homestats::models::{MetricQuery, RawRow, Sample, TimeRange};
use homestats::store::SeriesStore;

pub fn utc(s: &str) -> DateTime<Utc> {
    s.parse().expect("RFC3339 timestamp")
}

pub fn berlin() -> Tz {
    chrono_tz::Europe::Berlin
}

pub fn row(t: DateTime<Utc>, value: f64) -> RawRow {
    RawRow {
        timestamp_ms: t.timestamp_millis(),
        value: Some(value),
    }
}

/// Rows keyed by measurement. Failing and slow measurements are configurable per test.
#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<HashMap<String, Vec<RawRow>>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub reads: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, measurement: &str, rows: Vec<RawRow>) -> Self {
        self.rows
            .lock()
            .unwrap()
            .entry(measurement.to_string())
            .or_default()
            .extend(rows);
        self
    }

    pub fn failing(mut self, measurement: &str) -> Self {
        self.failing.insert(measurement.to_string());
        self
    }

    pub fn slow(mut self, measurement: &str, delay: Duration) -> Self {
        self.delays.insert(measurement.to_string(), delay);
        self
    }

    pub fn push(&self, measurement: &str, row: RawRow) {
        self.rows
            .lock()
            .unwrap()
            .entry(measurement.to_string())
            .or_default()
            .push(row);
    }

    async fn rows_in(&self, query: &MetricQuery, range: TimeRange) -> Result<Vec<RawRow>, StatsError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&query.measurement) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&query.measurement) {
            return Err(StatsError::StoreUnavailable("connection refused".into()));
        }
        let mut rows: Vec<RawRow> = self
            .rows
            .lock()
            .unwrap()
            .get(&query.measurement)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.timestamp_ms >= range.start_ms() && r.timestamp_ms < range.end_ms())
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.timestamp_ms);
        Ok(rows)
    }
}

impl SeriesStore for FakeStore {
    async fn latest(
        &self,
        query: &MetricQuery,
        range: TimeRange,
    ) -> Result<Option<Sample>, StatsError> {
        let rows = self.rows_in(query, range).await?;
        Ok(rows
            .into_iter()
            .rev()
            .find_map(|r| r.into_sample().ok()))
    }

    async fn raw_series(
        &self,
        query: &MetricQuery,
        range: TimeRange,
    ) -> Result<Vec<RawRow>, StatsError> {
        self.rows_in(query, range).await
    }
}
