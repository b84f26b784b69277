//! Approximate event log.
//!
//! The upstream API only reports cumulative totals, so a positive delta is
//! attributed to the whole window between two consecutive polls.

use std::path::Path;

use chrono::{DateTime, FixedOffset};

use super::csv_log;
use super::error::MetricsError;
use super::format_timestamp;

pub const EVENTS_HEADER: [&str; 4] = ["window_start", "window_end", "asset_name", "delta_downloads"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub window_start: DateTime<FixedOffset>,
    pub window_end: DateTime<FixedOffset>,
    pub asset_name: String,
    pub delta_downloads: u64,
}

impl EventRow {
    fn to_record(&self) -> [String; 4] {
        [
            format_timestamp(&self.window_start),
            format_timestamp(&self.window_end),
            self.asset_name.clone(),
            self.delta_downloads.to_string(),
        ]
    }
}

/// Append event rows, creating the log with its header if it does not
/// exist yet (also when `rows` is empty).
pub fn append_rows(path: &Path, rows: &[EventRow]) -> Result<usize, MetricsError> {
    csv_log::append_records(path, &EVENTS_HEADER, rows.iter().map(EventRow::to_record))
}
