// Period definitions: kind, calendar unit, trailing window, evaluated boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::{MetricQuery, StatField, TimeRange};
use crate::error::StatsError;

/// Whether a period is still accumulating, already frozen, or a window sliding with `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Current,
    Completed,
    /// `[now - span, now)`, not aligned to the calendar.
    Rolling,
}

impl FromStr for PeriodKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "current" => Ok(PeriodKind::Current),
            "completed" => Ok(PeriodKind::Completed),
            "rolling" => Ok(PeriodKind::Rolling),
            other => Err(StatsError::config(format!(
                "unknown period kind '{}' (expected current, completed or rolling)",
                other
            ))),
        }
    }
}

/// Calendar unit, ordered finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarUnit {
    Hour,
    Day,
    Month,
    Year,
}

impl CalendarUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarUnit::Hour => "hour",
            CalendarUnit::Day => "day",
            CalendarUnit::Month => "month",
            CalendarUnit::Year => "year",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            CalendarUnit::Hour => "h",
            CalendarUnit::Day => "d",
            CalendarUnit::Month => "mo",
            CalendarUnit::Year => "y",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "h" => Some(CalendarUnit::Hour),
            "d" => Some(CalendarUnit::Day),
            "mo" => Some(CalendarUnit::Month),
            "y" => Some(CalendarUnit::Year),
            _ => None,
        }
    }
}

impl fmt::Display for CalendarUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `hour`/`day`/`month`/`year` and the single-unit forms `1h`/`1d`/`1mo`/`1y`.
impl FromStr for CalendarUnit {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let unit = match s.as_str() {
            "hour" | "hourly" => Some(CalendarUnit::Hour),
            "day" | "daily" => Some(CalendarUnit::Day),
            "month" | "monthly" => Some(CalendarUnit::Month),
            "year" | "yearly" => Some(CalendarUnit::Year),
            other => other.strip_prefix('1').and_then(CalendarUnit::from_suffix),
        };
        unit.ok_or_else(|| StatsError::config(format!("unrecognized calendar unit '{}'", s)))
    }
}

/// History span summarized for a period, e.g. `30d` = thirty local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingWindow {
    pub count: u32,
    pub unit: CalendarUnit,
}

impl fmt::Display for TrailingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for TrailingWindow {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| StatsError::config(format!("trailing window '{}' has no unit", s)))?;
        let (digits, suffix) = s.split_at(split);
        let count: u32 = digits
            .parse()
            .map_err(|_| StatsError::config(format!("trailing window '{}' has no count", s)))?;
        let unit = CalendarUnit::from_suffix(suffix).ok_or_else(|| {
            StatsError::config(format!(
                "trailing window '{}' has unrecognized unit '{}' (expected h, d, mo, y)",
                s, suffix
            ))
        })?;
        if count == 0 {
            return Err(StatsError::config(format!(
                "trailing window '{}' must span at least one unit",
                s
            )));
        }
        Ok(TrailingWindow { count, unit })
    }
}

impl Serialize for TrailingWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Immutable period definition, built once from validated config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSpec {
    pub name: String,
    pub kind: PeriodKind,
    pub calendar_unit: CalendarUnit,
    /// Length of a rolling period; `None` for calendar periods.
    pub span: Option<TrailingWindow>,
    pub trailing_window: Option<TrailingWindow>,
    pub bucket_width: Option<CalendarUnit>,
    /// Summary fields to compute; the rest are omitted.
    pub stats: Vec<StatField>,
}

impl PeriodSpec {
    /// Period without a trailing summary.
    pub fn plain(name: &str, kind: PeriodKind, calendar_unit: CalendarUnit) -> Self {
        Self {
            name: name.to_string(),
            kind,
            calendar_unit,
            span: None,
            trailing_window: None,
            bucket_width: None,
            stats: StatField::ALL.to_vec(),
        }
    }

    /// Period with a trailing-window summary bucketed at `bucket_width`.
    pub fn summarized(
        name: &str,
        kind: PeriodKind,
        calendar_unit: CalendarUnit,
        trailing_window: TrailingWindow,
        bucket_width: CalendarUnit,
    ) -> Self {
        Self::plain(name, kind, calendar_unit).with_summary(trailing_window, bucket_width)
    }

    /// Rolling period of length `span`, e.g. `24h` for the last 24 hours.
    pub fn rolling(name: &str, span: TrailingWindow) -> Self {
        Self {
            span: Some(span),
            ..Self::plain(name, PeriodKind::Rolling, span.unit)
        }
    }

    /// Adds a trailing-window summary bucketed at `bucket_width`.
    pub fn with_summary(
        mut self,
        trailing_window: TrailingWindow,
        bucket_width: CalendarUnit,
    ) -> Self {
        self.trailing_window = Some(trailing_window);
        self.bucket_width = Some(bucket_width);
        self
    }

    pub fn wants_summary(&self) -> bool {
        self.trailing_window.is_some() && self.bucket_width.is_some() && !self.stats.is_empty()
    }

    /// Rejects conflicting window/bucket settings.
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.name.trim().is_empty() {
            return Err(StatsError::config("period name must be non-empty"));
        }
        match (self.kind, self.span) {
            (PeriodKind::Rolling, None) => {
                return Err(StatsError::config(format!(
                    "period '{}': rolling periods require span",
                    self.name
                )));
            }
            (PeriodKind::Rolling, Some(span)) if span.count == 0 => {
                return Err(StatsError::config(format!(
                    "period '{}': span must cover at least one unit",
                    self.name
                )));
            }
            (PeriodKind::Rolling, Some(span)) if span.unit != self.calendar_unit => {
                return Err(StatsError::config(format!(
                    "period '{}': span {} does not match calendar_unit {}",
                    self.name, span, self.calendar_unit
                )));
            }
            (PeriodKind::Current | PeriodKind::Completed, Some(_)) => {
                return Err(StatsError::config(format!(
                    "period '{}': span is only valid for rolling periods",
                    self.name
                )));
            }
            _ => {}
        }
        match (self.trailing_window, self.bucket_width) {
            (None, None) => {}
            (Some(_), None) => {
                return Err(StatsError::config(format!(
                    "period '{}': trailing_window requires bucket_width",
                    self.name
                )));
            }
            (None, Some(_)) => {
                return Err(StatsError::config(format!(
                    "period '{}': bucket_width requires trailing_window",
                    self.name
                )));
            }
            (Some(window), Some(bucket)) => {
                if bucket > window.unit {
                    return Err(StatsError::config(format!(
                        "period '{}': bucket_width {} is coarser than trailing_window {}",
                        self.name, bucket, window
                    )));
                }
                if window.count == 0 {
                    return Err(StatsError::config(format!(
                        "period '{}': trailing_window must span at least one unit",
                        self.name
                    )));
                }
            }
        }
        if self.stats.is_empty() {
            return Err(StatsError::config(format!(
                "period '{}': stats must list at least one of min, max, p20, p50, p80",
                self.name
            )));
        }
        Ok(())
    }
}

/// `[start, end)` of a period at a reference instant. `is_closed` is true only for completed periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Boundary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_closed: bool,
}

impl Boundary {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }
}

/// Canonical, validated set of periods shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PeriodTable {
    specs: Vec<PeriodSpec>,
}

impl PeriodTable {
    pub fn new(specs: Vec<PeriodSpec>) -> Result<Self, StatsError> {
        if specs.is_empty() {
            return Err(StatsError::config("at least one period must be configured"));
        }
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(StatsError::config(format!(
                    "duplicate period name '{}'",
                    spec.name
                )));
            }
        }
        Ok(Self { specs })
    }

    /// this/last × hour/day/month/year plus `last_24h`. Completed hour, day and month
    /// periods carry 24h, 30d and 12mo trailing summaries bucketed by hour, day and month.
    /// `this_day` summarizes the seven completed days before today; `last_24h` summarizes
    /// its own rolling day by hour.
    pub fn builtin() -> Self {
        use CalendarUnit::*;
        use PeriodKind::*;
        let window = |count, unit| TrailingWindow { count, unit };
        Self {
            specs: vec![
                PeriodSpec::plain("this_hour", Current, Hour),
                PeriodSpec::summarized("last_hour", Completed, Hour, window(24, Hour), Hour),
                PeriodSpec::summarized("this_day", Current, Day, window(7, Day), Day),
                PeriodSpec::summarized("last_day", Completed, Day, window(30, Day), Day),
                PeriodSpec::plain("this_month", Current, Month),
                PeriodSpec::summarized("last_month", Completed, Month, window(12, Month), Month),
                PeriodSpec::plain("this_year", Current, Year),
                PeriodSpec::plain("last_year", Completed, Year),
                PeriodSpec::rolling("last_24h", window(24, Hour))
                    .with_summary(window(24, Hour), Hour),
            ],
        }
    }

    /// `(metric, period)` index pairs in configuration order. A metric with no period
    /// list gets every period in table order.
    pub fn resolve_pairs(
        &self,
        metrics: &[MetricQuery],
    ) -> Result<Vec<(usize, usize)>, StatsError> {
        let mut pairs = Vec::new();
        for (mi, metric) in metrics.iter().enumerate() {
            if metrics[..mi].iter().any(|m| m.id == metric.id) {
                return Err(StatsError::config(format!(
                    "duplicate metric id '{}'",
                    metric.id
                )));
            }
            if metric.periods.is_empty() {
                pairs.extend((0..self.specs.len()).map(|pi| (mi, pi)));
                continue;
            }
            for name in &metric.periods {
                let pi = self.position(name).ok_or_else(|| {
                    StatsError::config(format!(
                        "metric '{}' references unknown period '{}'",
                        metric.id, name
                    ))
                })?;
                pairs.push((mi, pi));
            }
        }
        Ok(pairs)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&PeriodSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn specs(&self) -> &[PeriodSpec] {
        &self.specs
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
