//! File-backed metrics state.
//!
//! Three files live under the metrics directory:
//! - the snapshot log, one row per asset per poll (complete census)
//! - the approximate event log, one row per asset with a positive delta
//! - the last-poll marker, replaced in full every run
//!
//! The previous-counts index is never stored on its own; it is rebuilt from
//! the snapshot log at the start of each run.

mod csv_log;
pub mod error;
pub mod events;
pub mod marker;
pub mod reconcile;
pub mod snapshot;

pub use reconcile::reconcile;
pub use snapshot::{HeaderState, PreviousCounts};

use chrono::{DateTime, FixedOffset};

/// Timestamp format shared by all three files, e.g. `2025-01-15T09:30:00+09:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
