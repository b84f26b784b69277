//! One poll run: load state, fetch, reconcile, append both logs, persist
//! the marker.
//!
//! Loading is read-only and the fetch happens before anything is created,
//! renamed or appended, so a failed fetch leaves the metrics directory
//! exactly as it was.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, SubsecRound, Utc};

use crate::config::MetricsPaths;
use crate::github::ReleaseSource;
use crate::metrics::{self, marker, snapshot, HeaderState, PreviousCounts};

/// What a run wrote, for the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub release_tag: String,
    pub snapshot_rows: usize,
    pub event_rows: usize,
    /// No usable marker existed, so event rows were suppressed.
    pub first_poll: bool,
    /// Where a snapshot log with a stale header was moved to.
    pub relocated: Option<PathBuf>,
}

pub async fn run_poll(
    source: &dyn ReleaseSource,
    owner: &str,
    repo: &str,
    paths: &MetricsPaths,
    now: DateTime<FixedOffset>,
) -> anyhow::Result<PollSummary> {
    let now = now.trunc_subsecs(0);

    // LOAD_STATE
    let header = snapshot::header_state(&paths.snapshot)?;
    let previous = match &header {
        HeaderState::Mismatch(found) => {
            tracing::warn!(
                path = %paths.snapshot.display(),
                found = %found.join(","),
                "Snapshot header mismatch; previous counts start empty"
            );
            PreviousCounts::new()
        }
        HeaderState::Absent | HeaderState::Matches => {
            snapshot::load_previous_counts(&paths.snapshot)?
        }
    };
    let previous_poll = marker::read_marker(&paths.marker, now.offset())?;
    tracing::debug!(
        known_assets = previous.len(),
        previous_poll = ?previous_poll.map(|t| metrics::format_timestamp(&t)),
        "Loaded state"
    );

    // FETCH
    let release = source
        .latest_release(owner, repo)
        .await
        .with_context(|| format!("Failed to fetch latest release of {}/{}", owner, repo))?;
    tracing::info!(
        tag = %release.tag,
        assets = release.assets.len(),
        "Fetched latest release"
    );

    // RECONCILE
    let reconciliation = metrics::reconcile(&previous, &release, now, previous_poll);

    // WRITE_SNAPSHOT
    std::fs::create_dir_all(&paths.dir)
        .with_context(|| format!("Failed to create {}", paths.dir.display()))?;
    let relocated = if let HeaderState::Mismatch(_) = header {
        let backup = snapshot::relocate_stale(&paths.snapshot, now.with_timezone(&Utc))?;
        tracing::warn!(
            "Header mismatch. Backed up {} -> {}",
            paths.snapshot.display(),
            backup.display()
        );
        Some(backup)
    } else {
        None
    };
    let snapshot_rows = snapshot::append_rows(&paths.snapshot, &reconciliation.snapshot_rows)?;

    // WRITE_EVENTS
    let event_rows = metrics::events::append_rows(&paths.events, &reconciliation.event_rows)?;

    // PERSIST_MARKER
    marker::write_marker(&paths.marker, &now)?;

    Ok(PollSummary {
        release_tag: release.tag,
        snapshot_rows,
        event_rows,
        first_poll: previous_poll.is_none(),
        relocated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{FetchError, Release, ReleaseAsset};
    use chrono::TimeZone;

    struct FixedSource(Release);

    #[async_trait::async_trait]
    impl ReleaseSource for FixedSource {
        async fn latest_release(&self, _owner: &str, _repo: &str) -> Result<Release, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl ReleaseSource for FailingSource {
        async fn latest_release(&self, owner: &str, repo: &str) -> Result<Release, FetchError> {
            Err(FetchError::Status {
                status: 401,
                url: format!("https://api.github.com/repos/{}/{}/releases/latest", owner, repo),
                body: "Bad credentials".into(),
            })
        }
    }

    fn jst(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 15, h, m, 0)
            .unwrap()
    }

    fn source(assets: &[(&str, u64)]) -> FixedSource {
        FixedSource(Release {
            tag: "v1.2".into(),
            assets: assets
                .iter()
                .map(|(name, count)| ReleaseAsset {
                    name: name.to_string(),
                    download_count: *count,
                })
                .collect(),
        })
    }

    fn read(path: &std::path::Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    const SNAPSHOT_HEADER_LINE: &str =
        "timestamp,release_tag,asset_name,download_count_total,delta_since_prev\n";
    const EVENTS_HEADER_LINE: &str = "window_start,window_end,asset_name,delta_downloads\n";

    #[tokio::test]
    async fn test_first_poll_suppresses_events() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(&dir.path().join("metrics"));

        let summary = run_poll(&source(&[("app.zip", 42)]), "o", "r", &paths, jst(9, 0))
            .await
            .unwrap();

        assert!(summary.first_poll);
        assert_eq!(summary.snapshot_rows, 1);
        assert_eq!(summary.event_rows, 0);
        assert_eq!(
            read(&paths.snapshot),
            format!("{}2025-01-15T09:00:00+09:00,v1.2,app.zip,42,0\n", SNAPSHOT_HEADER_LINE)
        );
        assert_eq!(read(&paths.events), EVENTS_HEADER_LINE);
        assert_eq!(read(&paths.marker), "2025-01-15T09:00:00+09:00");
    }

    #[tokio::test]
    async fn test_end_to_end_with_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        std::fs::write(
            &paths.snapshot,
            format!("{}2025-01-15T08:00:00+09:00,v1.1,app.tar.gz,100,0\n", SNAPSHOT_HEADER_LINE),
        )
        .unwrap();
        std::fs::write(&paths.marker, "2025-01-15T08:00:00+09:00").unwrap();

        let summary = run_poll(
            &source(&[("app.tar.gz", 107), ("app.zip", 3)]),
            "o",
            "r",
            &paths,
            jst(9, 0),
        )
        .await
        .unwrap();

        assert!(!summary.first_poll);
        assert_eq!(summary.release_tag, "v1.2");
        assert_eq!(summary.snapshot_rows, 2);
        assert_eq!(summary.event_rows, 1);
        assert_eq!(
            read(&paths.snapshot),
            format!(
                "{}2025-01-15T08:00:00+09:00,v1.1,app.tar.gz,100,0\n\
                 2025-01-15T09:00:00+09:00,v1.2,app.tar.gz,107,7\n\
                 2025-01-15T09:00:00+09:00,v1.2,app.zip,3,0\n",
                SNAPSHOT_HEADER_LINE
            )
        );
        assert_eq!(
            read(&paths.events),
            format!(
                "{}2025-01-15T08:00:00+09:00,2025-01-15T09:00:00+09:00,app.tar.gz,7\n",
                EVENTS_HEADER_LINE
            )
        );
        assert_eq!(read(&paths.marker), "2025-01-15T09:00:00+09:00");
    }

    #[tokio::test]
    async fn test_consecutive_runs_chain_windows() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());

        run_poll(&source(&[("a.zip", 10)]), "o", "r", &paths, jst(9, 0)).await.unwrap();
        run_poll(&source(&[("a.zip", 10)]), "o", "r", &paths, jst(10, 0)).await.unwrap();
        let summary = run_poll(&source(&[("a.zip", 14)]), "o", "r", &paths, jst(11, 0))
            .await
            .unwrap();

        assert_eq!(summary.event_rows, 1);
        assert_eq!(
            read(&paths.events),
            format!(
                "{}2025-01-15T10:00:00+09:00,2025-01-15T11:00:00+09:00,a.zip,4\n",
                EVENTS_HEADER_LINE
            )
        );
        let snapshot = read(&paths.snapshot);
        assert_eq!(snapshot.lines().count(), 4);
        assert!(snapshot.ends_with("2025-01-15T11:00:00+09:00,v1.2,a.zip,14,4\n"));
    }

    #[tokio::test]
    async fn test_header_mismatch_relocates_and_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        std::fs::write(&paths.snapshot, "a,b,c\n1,2,3\n").unwrap();
        std::fs::write(&paths.marker, "2025-01-15T08:00:00+09:00").unwrap();

        let summary = run_poll(&source(&[("app.zip", 9)]), "o", "r", &paths, jst(9, 0))
            .await
            .unwrap();

        let backup = summary.relocated.expect("stale snapshot relocated");
        assert_eq!(backup, dir.path().join("downloads_log_backup_20250115_000000.csv"));
        assert_eq!(read(&backup), "a,b,c\n1,2,3\n");
        assert_eq!(
            read(&paths.snapshot),
            format!("{}2025-01-15T09:00:00+09:00,v1.2,app.zip,9,0\n", SNAPSHOT_HEADER_LINE)
        );
        assert_eq!(summary.event_rows, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let metrics_dir = dir.path().join("metrics");
        let paths = MetricsPaths::new(&metrics_dir);

        let err = run_poll(&FailingSource, "o", "r", &paths, jst(9, 0))
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<FetchError>().and_then(FetchError::status), Some(401));
        assert!(!metrics_dir.exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_stale_snapshot_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        std::fs::write(&paths.snapshot, "a,b,c\n").unwrap();
        std::fs::write(&paths.marker, "2025-01-15T08:00:00+09:00").unwrap();

        assert!(run_poll(&FailingSource, "o", "r", &paths, jst(9, 0)).await.is_err());

        assert_eq!(read(&paths.snapshot), "a,b,c\n");
        assert_eq!(read(&paths.marker), "2025-01-15T08:00:00+09:00");
        assert!(!paths.events.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_marker_suppresses_events_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        std::fs::write(
            &paths.snapshot,
            format!("{}t,v1,a.zip,1,0\n", SNAPSHOT_HEADER_LINE),
        )
        .unwrap();
        std::fs::write(&paths.marker, "garbage").unwrap();

        let summary = run_poll(&source(&[("a.zip", 5)]), "o", "r", &paths, jst(9, 0))
            .await
            .unwrap();
        assert!(summary.first_poll);
        assert_eq!(summary.event_rows, 0);
        assert!(read(&paths.snapshot).ends_with(",a.zip,5,4\n"));
        assert_eq!(read(&paths.marker), "2025-01-15T09:00:00+09:00");
    }

    #[tokio::test]
    async fn test_subsecond_now_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        let now = jst(9, 0) + chrono::Duration::milliseconds(999);

        run_poll(&source(&[("a.zip", 1)]), "o", "r", &paths, now).await.unwrap();
        assert_eq!(read(&paths.marker), "2025-01-15T09:00:00+09:00");
    }

    #[tokio::test]
    async fn test_overflowing_logged_count_invents_no_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        std::fs::write(
            &paths.snapshot,
            format!("{}t,v1,a.zip,18446744073709551615,0\n", SNAPSHOT_HEADER_LINE),
        )
        .unwrap();
        std::fs::write(&paths.marker, "2025-01-15T08:00:00+09:00").unwrap();

        let summary = run_poll(&source(&[("a.zip", 5)]), "o", "r", &paths, jst(9, 0))
            .await
            .unwrap();

        assert_eq!(summary.event_rows, 0);
        assert!(read(&paths.snapshot).ends_with(",a.zip,5,0\n"));
        assert_eq!(read(&paths.events), EVENTS_HEADER_LINE);
    }

    #[tokio::test]
    async fn test_blank_snapshot_file_gets_header_and_keeps_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MetricsPaths::new(dir.path());
        std::fs::write(&paths.snapshot, "\n").unwrap();

        run_poll(&source(&[("a.zip", 5)]), "o", "r", &paths, jst(9, 0)).await.unwrap();
        assert_eq!(
            read(&paths.snapshot),
            format!("{}2025-01-15T09:00:00+09:00,v1.2,a.zip,5,0\n", SNAPSHOT_HEADER_LINE)
        );

        let summary = run_poll(&source(&[("a.zip", 8)]), "o", "r", &paths, jst(10, 0))
            .await
            .unwrap();
        assert_eq!(summary.relocated, None);
        assert_eq!(summary.event_rows, 1);
        assert!(read(&paths.snapshot).ends_with("2025-01-15T10:00:00+09:00,v1.2,a.zip,8,3\n"));
        assert_eq!(
            read(&paths.events),
            format!(
                "{}2025-01-15T09:00:00+09:00,2025-01-15T10:00:00+09:00,a.zip,3\n",
                EVENTS_HEADER_LINE
            )
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
