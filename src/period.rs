// Calendar-aligned period boundaries in a fixed time zone.
// Day/month/year floors are local midnights resolved through the zone, so DST days
// are 23h or 25h long instead of a naive 24h subtraction.

use chrono::{
    DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;

use crate::models::{Boundary, CalendarUnit, PeriodKind, PeriodSpec, TimeRange, TrailingWindow};

/// Boundaries of `spec` at `now`.
///
/// Current periods are `[floor(now), now)` and open; completed periods are the
/// unit immediately before, `[floor(now) - 1 unit, floor(now))`, and closed.
/// Rolling periods are `[now - span, now)` and open.
pub fn boundaries(spec: &PeriodSpec, now: DateTime<Utc>, tz: Tz) -> Boundary {
    if let (PeriodKind::Rolling, Some(span)) = (spec.kind, spec.span) {
        return Boundary {
            start: step_back(span, now, tz),
            end: now,
            is_closed: false,
        };
    }
    let current_start = floor_to(spec.calendar_unit, now, tz);
    match spec.kind {
        PeriodKind::Current => Boundary {
            start: current_start,
            end: now,
            is_closed: false,
        },
        PeriodKind::Completed | PeriodKind::Rolling => Boundary {
            start: shift_back(spec.calendar_unit, current_start, 1, tz),
            end: current_start,
            is_closed: spec.kind == PeriodKind::Completed,
        },
    }
}

/// History range summarized for `spec`, or `None` if it requests no summary.
///
/// Completed periods summarize up to and including themselves; current periods
/// summarize only the completed units before the one in progress. Rolling periods
/// slide the window back from `now` without aligning it.
pub fn trailing_range(spec: &PeriodSpec, boundary: &Boundary, tz: Tz) -> Option<TimeRange> {
    if !spec.wants_summary() {
        return None;
    }
    let window: TrailingWindow = spec.trailing_window?;
    let end = match spec.kind {
        PeriodKind::Rolling => {
            return Some(TimeRange {
                start: step_back(window, boundary.end, tz),
                end: boundary.end,
            });
        }
        PeriodKind::Completed => boundary.end,
        PeriodKind::Current => boundary.start,
    };
    // An end inside a window unit keeps its partial unit on top of `count` whole ones.
    let anchor = floor_to(window.unit, end, tz);
    Some(TimeRange {
        start: shift_back(window.unit, anchor, window.count, tz),
        end,
    })
}

/// Start of the calendar unit containing `t`, in `tz`.
pub fn floor_to(unit: CalendarUnit, t: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = t.with_timezone(&tz);
    match unit {
        // Subtract the local minutes so repeated hours at DST fall-back stay distinct.
        CalendarUnit::Hour => {
            let into_hour = TimeDelta::minutes(local.minute() as i64)
                + TimeDelta::seconds(local.second() as i64)
                + TimeDelta::nanoseconds(local.nanosecond() as i64);
            t - into_hour
        }
        CalendarUnit::Day => local_midnight(local.date_naive(), tz),
        CalendarUnit::Month => local_midnight(
            local.date_naive().with_day(1).unwrap_or(NaiveDate::MIN),
            tz,
        ),
        CalendarUnit::Year => local_midnight(
            NaiveDate::from_ymd_opt(local.year(), 1, 1).unwrap_or(NaiveDate::MIN),
            tz,
        ),
    }
}

/// Moves a unit-aligned instant `n` units back in calendar terms.
pub fn shift_back(unit: CalendarUnit, aligned: DateTime<Utc>, n: u32, tz: Tz) -> DateTime<Utc> {
    let date = aligned.with_timezone(&tz).date_naive();
    let shifted = match unit {
        CalendarUnit::Hour => return aligned - TimeDelta::hours(n as i64),
        CalendarUnit::Day => date.checked_sub_days(Days::new(n as u64)),
        CalendarUnit::Month => date.checked_sub_months(Months::new(n)),
        CalendarUnit::Year => n
            .checked_mul(12)
            .and_then(|months| date.checked_sub_months(Months::new(months))),
    };
    local_midnight(shifted.unwrap_or(NaiveDate::MIN), tz)
}

/// `t` moved back by `window` keeping the local wall-clock time; hours are exact durations.
pub fn step_back(window: TrailingWindow, t: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = t.with_timezone(&tz).naive_local();
    let shifted = match window.unit {
        CalendarUnit::Hour => return t - TimeDelta::hours(window.count as i64),
        CalendarUnit::Day => local.checked_sub_days(Days::new(window.count as u64)),
        CalendarUnit::Month => local.checked_sub_months(Months::new(window.count)),
        CalendarUnit::Year => window
            .count
            .checked_mul(12)
            .and_then(|months| local.checked_sub_months(Months::new(months))),
    };
    resolve_local(shifted.unwrap_or(NaiveDateTime::MIN), tz)
}

/// First instant of `date` in `tz`. When midnight falls in a DST gap, the first valid local time after it.
fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    resolve_local(midnight, tz)
}

fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    if let Some(t) = tz.from_local_datetime(&naive).earliest() {
        return t.with_timezone(&Utc);
    }
    (1..=16)
        .map(|q| naive + TimeDelta::minutes(15 * q))
        .find_map(|n| tz.from_local_datetime(&n).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn floor_to_hour_is_timezone_independent_for_whole_hour_offsets() {
        let t = utc("2024-06-15T10:42:13Z");
        assert_eq!(
            floor_to(CalendarUnit::Hour, t, chrono_tz::Europe::Berlin),
            utc("2024-06-15T10:00:00Z")
        );
    }

    #[test]
    fn floor_to_hour_keeps_repeated_fall_back_hour() {
        // 2024-10-27 02:30 CET (second pass) == 01:30Z
        let t = utc("2024-10-27T01:30:00Z");
        assert_eq!(
            floor_to(CalendarUnit::Hour, t, chrono_tz::Europe::Berlin),
            utc("2024-10-27T01:00:00Z")
        );
    }

    #[test]
    fn local_midnight_in_dst_gap_moves_forward() {
        // America/Sao_Paulo skipped 2018-11-04 00:00 -> 01:00 (-03 -> -02).
        let date = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let start = local_midnight(date, chrono_tz::America::Sao_Paulo);
        assert_eq!(start, utc("2018-11-04T03:00:00Z"));
    }

    #[test]
    fn step_back_day_keeps_wall_clock_across_spring_forward() {
        // Berlin 2024-03-31 is 23h long; 12:00 local on 04-01 steps back to 12:00 local on 03-31.
        let tz = chrono_tz::Europe::Berlin;
        let one_day = TrailingWindow {
            count: 1,
            unit: CalendarUnit::Day,
        };
        assert_eq!(
            step_back(one_day, utc("2024-04-01T10:00:00Z"), tz),
            utc("2024-03-31T10:00:00Z")
        );
        assert_eq!(
            step_back(one_day, utc("2024-03-31T10:00:00Z"), tz),
            utc("2024-03-30T11:00:00Z")
        );
    }

    #[test]
    fn shift_back_month_handles_year_rollover() {
        let tz = chrono_tz::Europe::Berlin;
        let jan = floor_to(CalendarUnit::Month, utc("2024-01-20T12:00:00Z"), tz);
        assert_eq!(
            shift_back(CalendarUnit::Month, jan, 1, tz),
            utc("2023-11-30T23:00:00Z")
        );
    }
}
