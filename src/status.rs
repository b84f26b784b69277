//! Read-only summary of a metrics directory.

use chrono::{DateTime, FixedOffset};

use crate::config::MetricsPaths;
use crate::metrics::error::MetricsError;
use crate::metrics::{self, HeaderState};

/// What the status command reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub last_poll: Option<DateTime<FixedOffset>>,
    /// Header found in a snapshot log that the next poll will back up.
    pub stale_header: Option<Vec<String>>,
    /// Most recent count per asset, sorted by name. Empty when the header is stale.
    pub counts: Vec<(String, u64)>,
}

/// Summarize the metrics directory, or `None` when no poll has written to it.
pub fn status_report(
    paths: &MetricsPaths,
    offset: &FixedOffset,
) -> Result<Option<StatusReport>, MetricsError> {
    if !paths.snapshot.exists() && !paths.marker.exists() {
        return Ok(None);
    }

    let last_poll = metrics::marker::read_marker(&paths.marker, offset)?
        .map(|at| at.with_timezone(offset));

    if let HeaderState::Mismatch(found) = metrics::snapshot::header_state(&paths.snapshot)? {
        return Ok(Some(StatusReport {
            last_poll,
            stale_header: Some(found),
            counts: Vec::new(),
        }));
    }

    let mut counts: Vec<(String, u64)> = metrics::snapshot::load_previous_counts(&paths.snapshot)?
        .into_iter()
        .collect();
    counts.sort();
    Ok(Some(StatusReport {
        last_poll,
        stale_header: None,
        counts,
    }))
}
