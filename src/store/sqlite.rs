// SQLite time-series store. Uses sqlx for async + connection pooling.
// One row per reading; series identified by (measurement, field, canonical tags).
// Values are nullable so the write path can record readings it could not parse.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use futures_util::TryStreamExt;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use super::{SeriesStore, encode_tags, snapshots};
use crate::error::StatsError;
use crate::models::{MetricQuery, MetricSnapshotEntry, RawRow, Sample, Snapshot, TimeRange};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                measurement TEXT NOT NULL,
                field TEXT NOT NULL,
                tags TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                value REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_samples_series_created_at ON samples(measurement, field, tags, created_at)",
        )
        .execute(&self.pool)
        .await?;

        snapshots::init_period_stats_table(&self.pool).await?;

        Ok(())
    }

    /// Appends readings to one series. Minimal ingest path for collectors and tests.
    #[instrument(skip(self, tags, rows), fields(repo = "samples", operation = "save_samples", rows_count = rows.len()))]
    pub async fn save_samples(
        &self,
        measurement: &str,
        field: &str,
        tags: &BTreeMap<String, String>,
        rows: &[RawRow],
    ) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tags = encode_tags(tags);
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                "INSERT INTO samples (measurement, field, tags, created_at, value) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(measurement)
            .bind(field)
            .bind(&tags)
            .bind(r.timestamp_ms)
            .bind(r.value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Persists every entry of a published snapshot; absent fields are stored as NULL.
    #[instrument(skip(self, snapshot), fields(repo = "period_stats", operation = "save_snapshot", entries_count = snapshot.entries.len()))]
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        snapshots::save_snapshot(&self.pool, snapshot).await
    }

    /// Most recent persisted entries for one (metric, period), newest first.
    pub async fn get_recent_period_stats(
        &self,
        metric_id: &str,
        period_name: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<MetricSnapshotEntry>> {
        snapshots::get_recent(&self.pool, metric_id, period_name, limit).await
    }
}

impl SeriesStore for SqliteStore {
    #[instrument(skip(self, query), fields(repo = "samples", operation = "latest", metric = %query.id))]
    async fn latest(
        &self,
        query: &MetricQuery,
        range: TimeRange,
    ) -> Result<Option<Sample>, StatsError> {
        // Newest first; unusable rows are skipped until one converts.
        let mut rows = sqlx::query(
            "SELECT created_at, value FROM samples
             WHERE measurement = $1 AND field = $2 AND tags = $3
               AND created_at >= $4 AND created_at < $5 AND value IS NOT NULL
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&query.measurement)
        .bind(&query.field)
        .bind(encode_tags(&query.tags))
        .bind(range.start_ms())
        .bind(range.end_ms())
        .fetch(&self.pool);

        while let Some(row) = rows.try_next().await? {
            let raw = RawRow {
                timestamp_ms: row.try_get("created_at")?,
                value: row.try_get("value")?,
            };
            match raw.into_sample() {
                Ok(sample) => return Ok(Some(sample)),
                Err(e) => tracing::warn!(metric = %query.id, error = %e, "skipping unusable latest row"),
            }
        }
        Ok(None)
    }

    #[instrument(skip(self, query), fields(repo = "samples", operation = "raw_series", metric = %query.id))]
    async fn raw_series(
        &self,
        query: &MetricQuery,
        range: TimeRange,
    ) -> Result<Vec<RawRow>, StatsError> {
        let rows = sqlx::query(
            "SELECT created_at, value FROM samples
             WHERE measurement = $1 AND field = $2 AND tags = $3
               AND created_at >= $4 AND created_at < $5
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&query.measurement)
        .bind(&query.field)
        .bind(encode_tags(&query.tags))
        .bind(range.start_ms())
        .bind(range.end_ms())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(RawRow {
                timestamp_ms: row.try_get("created_at")?,
                value: row.try_get("value")?,
            });
        }
        Ok(out)
    }
}
