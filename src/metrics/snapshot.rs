//! Snapshot log: the periodic census of cumulative download counts.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};

use super::csv_log;
use super::error::MetricsError;
use super::format_timestamp;

pub const SNAPSHOT_HEADER: [&str; 5] = [
    "timestamp",
    "release_tag",
    "asset_name",
    "download_count_total",
    "delta_since_prev",
];

const NAME_COLUMN: &str = "asset_name";
const COUNT_COLUMN: &str = "download_count_total";

/// Asset name -> most recently logged cumulative count.
pub type PreviousCounts = HashMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub timestamp: DateTime<FixedOffset>,
    pub release_tag: String,
    pub asset_name: String,
    pub download_count_total: u64,
    /// Negative when the upstream count went down; kept as observed.
    pub delta_since_prev: i64,
}

impl SnapshotRow {
    fn to_record(&self) -> [String; 5] {
        [
            format_timestamp(&self.timestamp),
            self.release_tag.clone(),
            self.asset_name.clone(),
            self.download_count_total.to_string(),
            self.delta_since_prev.to_string(),
        ]
    }
}

/// What the existing snapshot log's first line says about its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderState {
    /// No file, or one holding only blank lines.
    Absent,
    Matches,
    Mismatch(Vec<String>),
}

/// Read the first CSV record of `path`, or `None` for a missing or blank file.
pub fn read_header(path: &Path) -> Result<Option<Vec<String>>, MetricsError> {
    csv_log::first_record(path)
}

pub fn header_state(path: &Path) -> Result<HeaderState, MetricsError> {
    Ok(match read_header(path)? {
        None => HeaderState::Absent,
        Some(found) if found == SNAPSHOT_HEADER => HeaderState::Matches,
        Some(found) => HeaderState::Mismatch(found),
    })
}

/// Rebuild the previous-counts index by replaying the snapshot log.
///
/// Rows are looked up by column name, so the index survives column
/// reordering. A row with an empty asset name, too few fields, or a count
/// that is empty, negative, non-integer or above `i64::MAX` is skipped. A
/// later row for the same asset replaces an earlier one.
pub fn load_previous_counts(path: &Path) -> Result<PreviousCounts, MetricsError> {
    let mut counts = PreviousCounts::new();
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(r) => r,
        Err(e) => {
            if let csv::ErrorKind::Io(io_err) = e.kind() {
                if io_err.kind() == io::ErrorKind::NotFound {
                    return Ok(counts);
                }
            }
            return Err(MetricsError::csv(path)(e));
        }
    };

    let headers = reader.headers().map_err(MetricsError::csv(path))?.clone();
    if headers.is_empty() {
        return Ok(counts);
    }
    let name_idx = headers.iter().position(|h| h == NAME_COLUMN);
    let count_idx = headers.iter().position(|h| h == COUNT_COLUMN);
    let (Some(name_idx), Some(count_idx)) = (name_idx, count_idx) else {
        tracing::warn!(
            path = %path.display(),
            "Snapshot log has no {}/{} columns; starting from empty counts",
            NAME_COLUMN,
            COUNT_COLUMN
        );
        return Ok(counts);
    };

    let mut skipped = 0usize;
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable snapshot row");
                skipped += 1;
                continue;
            }
        };
        let name = record.get(name_idx).unwrap_or("");
        let total = record.get(count_idx).map(str::trim).unwrap_or("");
        if name.is_empty() || total.is_empty() {
            skipped += 1;
            continue;
        }
        // Counts are kept within i64 so deltas stay exact.
        match total.parse::<i64>() {
            Ok(total) if total >= 0 => {
                counts.insert(name.to_string(), total as u64);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            path = %path.display(),
            skipped,
            "Skipped malformed snapshot rows"
        );
    }
    Ok(counts)
}

/// Move a snapshot log whose header no longer matches out of the way.
///
/// The file is renamed to `<stem>_backup_<YYYYmmdd_HHMMSS><.ext>` next to
/// the original (UTC time of `at`), with a numeric suffix if that name is
/// already taken. Nothing is ever overwritten.
pub fn relocate_stale(path: &Path, at: DateTime<Utc>) -> Result<PathBuf, MetricsError> {
    let stamp = at.format("%Y%m%d_%H%M%S").to_string();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut backup = path.with_file_name(format!("{}_backup_{}{}", stem, stamp, ext));
    let mut n = 1u32;
    while backup.exists() {
        backup = path.with_file_name(format!("{}_backup_{}_{}{}", stem, stamp, n, ext));
        n += 1;
    }

    fs::rename(path, &backup).map_err(MetricsError::io(path))?;
    Ok(backup)
}

/// Append one row per asset. The header is written only to a new file.
pub fn append_rows(path: &Path, rows: &[SnapshotRow]) -> Result<usize, MetricsError> {
    csv_log::append_records(path, &SNAPSHOT_HEADER, rows.iter().map(SnapshotRow::to_record))
}
