// Error taxonomy for the statistics engine.
// Empty results are not errors: reads return Ok(None) / Ok(vec![]).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    /// Invalid period/metric configuration. Fatal at startup, never raised mid-cycle.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or database failure on a single read.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single read exceeded its deadline. Handled exactly like `StoreUnavailable`.
    #[error("store read timed out after {0:?}")]
    Timeout(Duration),

    /// A raw row missing a usable value. Only that row is skipped.
    #[error("malformed row at {timestamp_ms}: {reason}")]
    MalformedRow { timestamp_ms: i64, reason: String },
}

impl StatsError {
    pub fn config(msg: impl Into<String>) -> Self {
        StatsError::Configuration(msg.into())
    }

    /// True for per-query failures that degrade a field to absent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StatsError::StoreUnavailable(_) | StatsError::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for StatsError {
    fn from(e: sqlx::Error) -> Self {
        StatsError::StoreUnavailable(e.to_string())
    }
}
