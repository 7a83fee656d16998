// Metric queries and the per-cycle snapshot handed to the sink.
// Absent values serialize as null, never as zero.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// One summary statistic that can be requested per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatField {
    Min,
    Max,
    P20,
    P50,
    P80,
}

impl StatField {
    pub const ALL: [StatField; 5] = [
        StatField::Min,
        StatField::Max,
        StatField::P20,
        StatField::P50,
        StatField::P80,
    ];

    /// Percentile rank in [0, 100].
    pub fn rank(&self) -> f64 {
        match self {
            StatField::Min => 0.0,
            StatField::P20 => 20.0,
            StatField::P50 => 50.0,
            StatField::P80 => 80.0,
            StatField::Max => 100.0,
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatField::Min => "min",
            StatField::Max => "max",
            StatField::P20 => "p20",
            StatField::P50 => "p50",
            StatField::P80 => "p80",
        };
        f.write_str(s)
    }
}

impl FromStr for StatField {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min" => Ok(StatField::Min),
            "max" => Ok(StatField::Max),
            "p20" => Ok(StatField::P20),
            "p50" | "median" => Ok(StatField::P50),
            "p80" => Ok(StatField::P80),
            other => Err(StatsError::config(format!(
                "unknown stat '{}' (expected min, max, p20, p50, p80)",
                other
            ))),
        }
    }
}

/// Trend statistics over a trailing window. Fields not requested stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p20: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p80: Option<f64>,
}

impl StatSummary {
    pub fn get(&self, field: StatField) -> Option<f64> {
        match field {
            StatField::Min => self.min,
            StatField::Max => self.max,
            StatField::P20 => self.p20,
            StatField::P50 => self.p50,
            StatField::P80 => self.p80,
        }
    }

    pub(crate) fn set(&mut self, field: StatField, value: f64) {
        let slot = match field {
            StatField::Min => &mut self.min,
            StatField::Max => &mut self.max,
            StatField::P20 => &mut self.p20,
            StatField::P50 => &mut self.p50,
            StatField::P80 => &mut self.p80,
        };
        *slot = Some(value);
    }
}

/// Which series to read for a metric: measurement, field and exact tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricQuery {
    pub id: String,
    pub measurement: String,
    pub field: String,
    pub tags: BTreeMap<String, String>,
    /// Period names this metric is aggregated over.
    pub periods: Vec<String>,
}

impl MetricQuery {
    pub fn new(id: &str, measurement: &str, field: &str) -> Self {
        Self {
            id: id.to_string(),
            measurement: measurement.to_string(),
            field: field.to_string(),
            tags: BTreeMap::new(),
            periods: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_periods(mut self, periods: &[&str]) -> Self {
        self.periods = periods.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Result of one (metric, period) aggregation. Built once per cycle, never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshotEntry {
    pub metric_id: String,
    pub period_name: String,
    pub current_value: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub stats: Option<StatSummary>,
}

impl MetricSnapshotEntry {
    /// Entry with every field absent.
    pub fn absent(metric_id: &str, period_name: &str) -> Self {
        Self {
            metric_id: metric_id.to_string(),
            period_name: period_name.to_string(),
            current_value: None,
            observed_at: None,
            stats: None,
        }
    }

    pub fn is_fully_absent(&self) -> bool {
        self.current_value.is_none() && self.stats.is_none()
    }
}

/// Complete result set of one cycle, emitted once to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<MetricSnapshotEntry>,
}

impl Snapshot {
    pub fn entry(&self, metric_id: &str, period_name: &str) -> Option<&MetricSnapshotEntry> {
        self.entries
            .iter()
            .find(|e| e.metric_id == metric_id && e.period_name == period_name)
    }
}
