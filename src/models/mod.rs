// Domain models: periods, samples, snapshot entries.

mod period;
mod sample;
mod snapshot;

pub use period::{Boundary, CalendarUnit, PeriodKind, PeriodSpec, PeriodTable, TrailingWindow};
pub use sample::{RawRow, Sample, TimeRange};
pub use snapshot::{MetricQuery, MetricSnapshotEntry, Snapshot, StatField, StatSummary};
