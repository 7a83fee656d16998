// Summary statistics over bucketed values.
//
// Percentiles use the "linear" rule: rank r = p/100 * (n - 1), result interpolated
// between the order statistics at floor(r) and ceil(r). min and max are ranks 0 and
// 100 and therefore exact. The rule does not change with input size.

use crate::models::{StatField, StatSummary};

/// All five statistics, or `None` for empty input.
pub fn summarize(values: &[f64]) -> Option<StatSummary> {
    summarize_fields(values, &StatField::ALL)
}

/// Only the requested statistics; the others stay `None`. Non-finite values are ignored.
pub fn summarize_fields(values: &[f64], fields: &[StatField]) -> Option<StatSummary> {
    if fields.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mut summary = StatSummary::default();
    for &field in fields {
        if let Some(v) = percentile_sorted(&sorted, field.rank()) {
            summary.set(field, v);
        }
    }
    Some(summary)
}

/// Linear-interpolated percentile `p` (0..=100) of ascending `sorted`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let first = *sorted.first()?;
    let n = sorted.len();
    if n == 1 {
        return Some(first);
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (rank.ceil() as usize).min(n - 1);
    let (a, b) = (sorted[lo], sorted[hi]);
    if lo == hi {
        return Some(a);
    }
    // Clamp keeps rounding from stepping outside the bracketing pair.
    Some((a + (b - a) * (rank - lo as f64)).clamp(a, b))
}
