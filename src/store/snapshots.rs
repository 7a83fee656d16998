// period_stats table: one row per published snapshot entry, so dashboards can read
// period metrics from the same database. NULL means absent; zero is a real value.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::SqlitePool;

use crate::models::{MetricSnapshotEntry, Snapshot, StatSummary};

/// Creates the period_stats table and index if not present.
pub(super) async fn init_period_stats_table(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS period_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            generated_at INTEGER NOT NULL,
            metric_id TEXT NOT NULL,
            period_name TEXT NOT NULL,
            current_value REAL,
            observed_at INTEGER,
            has_stats INTEGER NOT NULL,
            stat_min REAL,
            stat_max REAL,
            stat_p20 REAL,
            stat_p50 REAL,
            stat_p80 REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_period_stats_metric_period ON period_stats(metric_id, period_name, generated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn save_snapshot(pool: &SqlitePool, snapshot: &Snapshot) -> anyhow::Result<()> {
    if snapshot.entries.is_empty() {
        return Ok(());
    }
    let generated_at = snapshot.generated_at.timestamp_millis();
    let mut tx = pool.begin().await?;
    for e in &snapshot.entries {
        let stats = e.stats.unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO period_stats
            (generated_at, metric_id, period_name, current_value, observed_at, has_stats,
             stat_min, stat_max, stat_p20, stat_p50, stat_p80)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(generated_at)
        .bind(&e.metric_id)
        .bind(&e.period_name)
        .bind(e.current_value)
        .bind(e.observed_at.map(|t| t.timestamp_millis()))
        .bind(e.stats.is_some())
        .bind(stats.min)
        .bind(stats.max)
        .bind(stats.p20)
        .bind(stats.p50)
        .bind(stats.p80)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub(super) async fn get_recent(
    pool: &SqlitePool,
    metric_id: &str,
    period_name: &str,
    limit: u32,
) -> anyhow::Result<Vec<MetricSnapshotEntry>> {
    let rows = sqlx::query(
        "SELECT metric_id, period_name, current_value, observed_at, has_stats,
                stat_min, stat_max, stat_p20, stat_p50, stat_p80
         FROM period_stats WHERE metric_id = $1 AND period_name = $2
         ORDER BY generated_at DESC, id DESC LIMIT $3",
    )
    .bind(metric_id)
    .bind(period_name)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let observed_at: Option<i64> = row.try_get("observed_at")?;
        let has_stats: bool = row.try_get("has_stats")?;
        let stats = if has_stats {
            Some(StatSummary {
                min: row.try_get("stat_min")?,
                max: row.try_get("stat_max")?,
                p20: row.try_get("stat_p20")?,
                p50: row.try_get("stat_p50")?,
                p80: row.try_get("stat_p80")?,
            })
        } else {
            None
        };
        out.push(MetricSnapshotEntry {
            metric_id: row.try_get("metric_id")?,
            period_name: row.try_get("period_name")?,
            current_value: row.try_get("current_value")?,
            observed_at: observed_at.and_then(millis_to_utc),
            stats,
        });
    }
    Ok(out)
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
