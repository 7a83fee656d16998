// Density normalization: one representative sample per calendar bucket.
// A series polled every 5 minutes and one polled hourly contribute the same number
// of points to the summary, so percentiles are not weighted by polling rate.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::{CalendarUnit, Sample, TimeRange};
use crate::period::floor_to;

/// Keeps the last sample (greatest timestamp, later input on ties) of each `bucket_width`
/// bucket inside `window`. Empty buckets are omitted, never zero-filled. Output is ascending.
pub fn sample(
    rows: &[Sample],
    bucket_width: CalendarUnit,
    window: &TimeRange,
    tz: Tz,
) -> Vec<Sample> {
    if rows.is_empty() || window.is_empty() {
        return Vec::new();
    }
    let mut by_bucket: BTreeMap<DateTime<Utc>, Sample> = BTreeMap::new();
    for s in rows {
        if !window.contains(s.timestamp) {
            continue;
        }
        let bucket = floor_to(bucket_width, s.timestamp, tz);
        match by_bucket.entry(bucket) {
            Entry::Vacant(slot) => {
                slot.insert(*s);
            }
            Entry::Occupied(mut slot) => {
                if s.timestamp >= slot.get().timestamp {
                    slot.insert(*s);
                }
            }
        }
    }
    by_bucket.into_values().collect()
}

/// Values of `samples`, in order.
pub fn values(samples: &[Sample]) -> Vec<f64> {
    samples.iter().map(|s| s.value).collect()
}
