// One (metric, period) aggregation against an in-memory store

mod common;

use std::time::Duration;

use chrono::TimeDelta;
use common::{FakeStore, berlin, row, utc};
use homestats::aggregator::PeriodAggregator;
use homestats::models::{MetricQuery, PeriodTable, RawRow};

const TIMEOUT: Duration = Duration::from_millis(50);

fn consumption() -> MetricQuery {
    MetricQuery::new("electricity_consumption", "electricity", "power_w")
}

/// One sample per day at 12:00Z for the 30 local days before 2024-04-10,
/// plus an earlier sample each day that bucketing must drop.
fn thirty_days() -> Vec<RawRow> {
    let first = utc("2024-03-11T12:00:00Z");
    let mut rows = Vec::new();
    for i in 0..30 {
        let noon = first + TimeDelta::days(i);
        rows.push(row(noon - TimeDelta::hours(6), 1000.0));
        rows.push(row(noon, (i + 1) as f64));
    }
    // Outside the trailing window.
    rows.push(row(utc("2024-03-10T12:00:00Z"), -50.0));
    rows
}

#[tokio::test]
async fn completed_day_with_thirty_day_trend() {
    let store = FakeStore::new().with_rows("electricity", thirty_days());
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let now = utc("2024-04-10T10:00:00Z");
    let entry = aggregator
        .aggregate(&consumption(), table.get("last_day").unwrap(), now)
        .await;

    assert_eq!(entry.metric_id, "electricity_consumption");
    assert_eq!(entry.period_name, "last_day");
    assert_eq!(entry.current_value, Some(30.0));
    assert_eq!(entry.observed_at, Some(utc("2024-04-09T12:00:00Z")));
    let stats = entry.stats.unwrap();
    assert_eq!(stats.min, Some(1.0));
    assert_eq!(stats.max, Some(30.0));
    assert!((stats.p50.unwrap() - 15.5).abs() < 1e-9);
}

#[tokio::test]
async fn current_day_summarizes_the_previous_week() {
    let store = FakeStore::new().with_rows("electricity", thirty_days());
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("this_day").unwrap(),
            utc("2024-04-10T10:00:00Z"),
        )
        .await;

    // Nothing recorded yet today.
    assert_eq!(entry.current_value, None);
    // Local days 2024-04-03 ..= 2024-04-09 carry values 24 ..= 30.
    let stats = entry.stats.unwrap();
    assert_eq!(stats.min, Some(24.0));
    assert_eq!(stats.max, Some(30.0));
    assert!((stats.p50.unwrap() - 27.0).abs() < 1e-9);
}

#[tokio::test]
async fn last_24h_summarizes_hourly_points() {
    // Hourly readings at :15; values 2..=25 fall inside [2024-06-14T10:30, 2024-06-15T10:30).
    let start = utc("2024-06-14T09:15:00Z");
    let mut rows: Vec<RawRow> = (0..26)
        .map(|i| row(start + TimeDelta::hours(i), i as f64))
        .collect();
    rows.push(row(utc("2024-06-15T10:30:00Z"), 99.0));
    let store = FakeStore::new().with_rows("electricity", rows);
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("last_24h").unwrap(),
            utc("2024-06-15T10:30:00Z"),
        )
        .await;

    assert_eq!(entry.current_value, Some(25.0));
    assert_eq!(entry.observed_at, Some(utc("2024-06-15T10:15:00Z")));
    let stats = entry.stats.unwrap();
    assert_eq!(stats.min, Some(2.0));
    assert_eq!(stats.max, Some(25.0));
    assert!((stats.p50.unwrap() - 13.5).abs() < 1e-9);
}

#[tokio::test]
async fn current_hour_reports_latest_value_only() {
    let store = FakeStore::new().with_rows(
        "electricity",
        vec![
            row(utc("2024-06-15T09:59:00Z"), 1.0),
            row(utc("2024-06-15T10:05:00Z"), 2.0),
            row(utc("2024-06-15T10:40:00Z"), 3.5),
        ],
    );
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("this_hour").unwrap(),
            utc("2024-06-15T10:42:00Z"),
        )
        .await;
    assert_eq!(entry.current_value, Some(3.5));
    assert_eq!(entry.observed_at, Some(utc("2024-06-15T10:40:00Z")));
    assert_eq!(entry.stats, None);
}

#[tokio::test]
async fn no_data_gives_absent_entry() {
    let store = FakeStore::new();
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("last_day").unwrap(),
            utc("2024-04-10T10:00:00Z"),
        )
        .await;
    assert!(entry.is_fully_absent());
    assert_eq!(entry.observed_at, None);
}

#[tokio::test]
async fn value_present_but_no_trend_history() {
    // Only yesterday has data: live value present, trend computed from one bucket.
    let store = FakeStore::new().with_rows("electricity", vec![row(utc("2024-04-09T12:00:00Z"), 4.0)]);
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("last_day").unwrap(),
            utc("2024-04-10T10:00:00Z"),
        )
        .await;
    assert_eq!(entry.current_value, Some(4.0));
    assert_eq!(entry.stats.unwrap().p50, Some(4.0));
}

#[tokio::test]
async fn store_error_gives_absent_entry() {
    let store = FakeStore::new()
        .with_rows("electricity", thirty_days())
        .failing("electricity");
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("last_day").unwrap(),
            utc("2024-04-10T10:00:00Z"),
        )
        .await;
    assert!(entry.is_fully_absent());
}

#[tokio::test(start_paused = true)]
async fn slow_read_times_out_to_absent() {
    let store = FakeStore::new()
        .with_rows("electricity", thirty_days())
        .slow("electricity", Duration::from_secs(5));
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("last_day").unwrap(),
            utc("2024-04-10T10:00:00Z"),
        )
        .await;
    assert!(entry.is_fully_absent());
}

#[tokio::test]
async fn malformed_rows_are_skipped() {
    let mut rows = vec![
        row(utc("2024-04-07T12:00:00Z"), 2.0),
        row(utc("2024-04-08T12:00:00Z"), 4.0),
    ];
    // Null value in the newest bucket: dropped, so 2024-04-09 contributes nothing.
    rows.push(RawRow {
        timestamp_ms: utc("2024-04-09T12:00:00Z").timestamp_millis(),
        value: None,
    });
    rows.push(RawRow {
        timestamp_ms: utc("2024-04-06T12:00:00Z").timestamp_millis(),
        value: Some(f64::NAN),
    });
    let store = FakeStore::new().with_rows("electricity", rows);
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);

    let entry = aggregator
        .aggregate(
            &consumption(),
            table.get("last_day").unwrap(),
            utc("2024-04-10T10:00:00Z"),
        )
        .await;
    let stats = entry.stats.unwrap();
    assert_eq!(stats.min, Some(2.0));
    assert_eq!(stats.max, Some(4.0));
    assert_eq!(entry.current_value, None);
}

#[tokio::test]
async fn reads_are_issued_once_per_field() {
    let store = FakeStore::new().with_rows("electricity", thirty_days());
    let table = PeriodTable::builtin();
    let aggregator = PeriodAggregator::new(&store, berlin(), TIMEOUT);
    let now = utc("2024-04-10T10:00:00Z");

    aggregator
        .aggregate(&consumption(), table.get("this_hour").unwrap(), now)
        .await;
    assert_eq!(store.reads.load(std::sync::atomic::Ordering::SeqCst), 1);

    aggregator
        .aggregate(&consumption(), table.get("last_day").unwrap(), now)
        .await;
    assert_eq!(store.reads.load(std::sync::atomic::Ordering::SeqCst), 3);
}
