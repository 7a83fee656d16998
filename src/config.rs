use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::StatsError;
use crate::models::{
    CalendarUnit, MetricQuery, PeriodKind, PeriodSpec, PeriodTable, StatField, TrailingWindow,
};
use crate::service::ServiceConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub stats: StatsConfig,
    /// Empty means the built-in period table.
    #[serde(default)]
    pub periods: Vec<PeriodConfig>,
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// IANA zone all calendar periods are evaluated in, e.g. "Europe/Berlin".
    pub timezone: String,
    pub cycle_interval_secs: u64,
    /// Optional cron expression (local to `timezone`); overrides `cycle_interval_secs`.
    #[serde(default)]
    pub cycle_schedule: Option<String>,
    pub query_timeout_ms: u64,
    pub cycle_deadline_ms: u64,
    #[serde(default = "default_persist_snapshots")]
    pub persist_snapshots: bool,
    /// Max number of snapshots kept in the broadcast channel for /ws/snapshot (slow clients may lag).
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_persist_snapshots() -> bool {
    true
}

fn default_broadcast_capacity() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodConfig {
    pub name: String,
    pub kind: String,
    /// Required for current/completed periods; rolling periods default to the span's unit.
    #[serde(default)]
    pub calendar_unit: Option<String>,
    /// Length of a rolling period, e.g. "24h".
    #[serde(default)]
    pub span: Option<String>,
    #[serde(default)]
    pub trailing_window: Option<String>,
    #[serde(default)]
    pub bucket_width: Option<String>,
    /// Subset of min, max, p20, p50, p80. Defaults to all five.
    #[serde(default)]
    pub stats: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    pub id: String,
    pub measurement: String,
    pub field: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Period names; empty means every configured period.
    #[serde(default)]
    pub periods: Vec<String>,
}

impl PeriodConfig {
    fn to_spec(&self) -> Result<PeriodSpec, StatsError> {
        let stats = match &self.stats {
            None => StatField::ALL.to_vec(),
            Some(names) => names
                .iter()
                .map(|s| StatField::from_str(s))
                .collect::<Result<Vec<_>, _>>()?,
        };
        let span = self
            .span
            .as_deref()
            .map(TrailingWindow::from_str)
            .transpose()?;
        let calendar_unit = match (self.calendar_unit.as_deref(), span) {
            (Some(unit), _) => CalendarUnit::from_str(unit)?,
            (None, Some(span)) => span.unit,
            (None, None) => {
                return Err(StatsError::config(format!(
                    "period '{}': calendar_unit is required",
                    self.name
                )));
            }
        };
        let spec = PeriodSpec {
            name: self.name.clone(),
            kind: PeriodKind::from_str(&self.kind)?,
            calendar_unit,
            span,
            trailing_window: self
                .trailing_window
                .as_deref()
                .map(TrailingWindow::from_str)
                .transpose()?,
            bucket_width: self
                .bucket_width
                .as_deref()
                .map(CalendarUnit::from_str)
                .transpose()?,
            stats,
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Zone all periods are evaluated in.
    pub fn timezone(&self) -> Result<Tz, StatsError> {
        self.stats.timezone.parse::<Tz>().map_err(|_| {
            StatsError::config(format!("stats.timezone: unknown zone '{}'", self.stats.timezone))
        })
    }

    /// The canonical period table: configured `[[periods]]`, or the built-in set.
    pub fn period_table(&self) -> Result<PeriodTable, StatsError> {
        if self.periods.is_empty() {
            return Ok(PeriodTable::builtin());
        }
        let specs = self
            .periods
            .iter()
            .map(PeriodConfig::to_spec)
            .collect::<Result<Vec<_>, _>>()?;
        PeriodTable::new(specs)
    }

    /// Metric queries, checked against `table` via [`PeriodTable::resolve_pairs`].
    pub fn metric_queries(&self, table: &PeriodTable) -> Result<Vec<MetricQuery>, StatsError> {
        let mut out: Vec<MetricQuery> = Vec::with_capacity(self.metrics.len());
        for m in &self.metrics {
            if m.id.trim().is_empty() || m.measurement.trim().is_empty() || m.field.trim().is_empty()
            {
                return Err(StatsError::config(
                    "metrics: id, measurement and field must be non-empty",
                ));
            }
            out.push(MetricQuery {
                id: m.id.clone(),
                measurement: m.measurement.clone(),
                field: m.field.clone(),
                tags: m.tags.clone(),
                periods: m.periods.clone(),
            });
        }
        table.resolve_pairs(&out)?;
        Ok(out)
    }

    pub fn service_config(&self) -> Result<ServiceConfig, StatsError> {
        Ok(ServiceConfig {
            tz: self.timezone()?,
            query_timeout: Duration::from_millis(self.stats.query_timeout_ms),
            cycle_deadline: Duration::from_millis(self.stats.cycle_deadline_ms),
        })
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.stats.cycle_interval_secs > 0,
            "stats.cycle_interval_secs must be > 0, got {}",
            self.stats.cycle_interval_secs
        );
        anyhow::ensure!(
            self.stats.query_timeout_ms > 0,
            "stats.query_timeout_ms must be > 0, got {}",
            self.stats.query_timeout_ms
        );
        anyhow::ensure!(
            self.stats.cycle_deadline_ms > self.stats.query_timeout_ms,
            "stats.cycle_deadline_ms must exceed stats.query_timeout_ms, got {} <= {}",
            self.stats.cycle_deadline_ms,
            self.stats.query_timeout_ms
        );
        anyhow::ensure!(
            self.stats.broadcast_capacity > 0,
            "stats.broadcast_capacity must be > 0, got {}",
            self.stats.broadcast_capacity
        );
        if let Some(ref expr) = self.stats.cycle_schedule {
            anyhow::ensure!(
                cron::Schedule::from_str(expr).is_ok(),
                "stats.cycle_schedule is not a valid cron expression: '{}'",
                expr
            );
        }
        anyhow::ensure!(
            !self.metrics.is_empty(),
            "at least one [[metrics]] entry is required"
        );

        self.timezone()?;
        let table = self.period_table()?;
        self.metric_queries(&table)?;
        Ok(())
    }
}
