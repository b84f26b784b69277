use chrono::{DateTime, FixedOffset};

use super::events::EventRow;
use super::snapshot::{PreviousCounts, SnapshotRow};
use crate::github::Release;

/// Rows produced by one poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    pub snapshot_rows: Vec<SnapshotRow>,
    pub event_rows: Vec<EventRow>,
}

/// Diff a fetched release against the previous counts.
///
/// Every asset gets a snapshot row. An asset never seen before is diffed
/// against its own count, so its first delta is 0. Event rows are emitted
/// only for positive deltas and only when a previous poll time exists; the
/// window is `[previous_poll, now]`. Assets repeated in one response are
/// each diffed against the pre-run index.
pub fn reconcile(
    previous: &PreviousCounts,
    release: &Release,
    now: DateTime<FixedOffset>,
    previous_poll: Option<DateTime<FixedOffset>>,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    for asset in &release.assets {
        let total = asset.download_count;
        let prev_total = previous.get(&asset.name).copied().unwrap_or(total);
        let delta = signed_delta(total, prev_total);

        out.snapshot_rows.push(SnapshotRow {
            timestamp: now,
            release_tag: release.tag.clone(),
            asset_name: asset.name.clone(),
            download_count_total: total,
            delta_since_prev: delta,
        });

        if let Some(window_start) = previous_poll {
            if delta > 0 {
                out.event_rows.push(EventRow {
                    window_start,
                    window_end: now,
                    asset_name: asset.name.clone(),
                    delta_downloads: delta as u64,
                });
            }
        }
    }

    out
}

/// `current - previous`, saturated to the `i64` range instead of wrapping.
fn signed_delta(current: u64, previous: u64) -> i64 {
    let delta = i128::from(current) - i128::from(previous);
    i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
}
