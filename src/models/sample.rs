// Time-series rows as read from the store.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// One reading: timestamp and value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Row exactly as stored; the value may be missing or unusable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRow {
    pub timestamp_ms: i64,
    pub value: Option<f64>,
}

impl RawRow {
    /// Validates the row into a `Sample`, or `MalformedRow` if a field is unusable.
    pub fn into_sample(self) -> Result<Sample, StatsError> {
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .ok_or_else(|| StatsError::MalformedRow {
                timestamp_ms: self.timestamp_ms,
                reason: "timestamp out of range".into(),
            })?;
        match self.value {
            Some(v) if v.is_finite() => Ok(Sample::new(timestamp, v)),
            Some(v) => Err(StatsError::MalformedRow {
                timestamp_ms: self.timestamp_ms,
                reason: format!("non-finite value {}", v),
            }),
            None => Err(StatsError::MalformedRow {
                timestamp_ms: self.timestamp_ms,
                reason: "missing value".into(),
            }),
        }
    }
}

/// Half-open read range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}
