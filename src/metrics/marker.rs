//! Last-poll marker: a single timestamp bounding the next event window.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime, SubsecRound};

use super::error::MetricsError;
use super::format_timestamp;

/// Read the previous poll time.
///
/// Accepts RFC 3339 timestamps, and naive `YYYY-MM-DDTHH:MM:SS` values which
/// are taken to be in `offset`. A missing, empty or unparseable marker
/// yields `None`, which only suppresses event rows for one run.
pub fn read_marker(
    path: &Path,
    offset: &FixedOffset,
) -> Result<Option<DateTime<FixedOffset>>, MetricsError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MetricsError::io(path)(e)),
    };
    let s = content.trim();
    if s.is_empty() {
        return Ok(None);
    }

    let parsed = parse_marker(s, offset);
    if parsed.is_none() {
        tracing::warn!(
            path = %path.display(),
            value = s,
            "Unparseable last-poll marker; treating as no prior poll"
        );
    }
    Ok(parsed)
}

fn parse_marker(s: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(*offset).single())
}

/// Replace the marker with `at`, truncated to whole seconds.
///
/// Written to a sibling `.tmp` file first and renamed over the marker so a
/// reader never sees a half-written timestamp.
pub fn write_marker(path: &Path, at: &DateTime<FixedOffset>) -> Result<(), MetricsError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, format_timestamp(&at.trunc_subsecs(0))).map_err(MetricsError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(MetricsError::io(path))?;
    Ok(())
}
