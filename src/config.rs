use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::cli::PollArgs;

const SNAPSHOT_FILE: &str = "downloads_log.csv";
const EVENTS_FILE: &str = "download_events_approx.csv";
const MARKER_FILE: &str = "last_poll.txt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .names.join("/"))]
    Missing { names: Vec<&'static str> },

    #[error("Invalid UTC offset '{0}'. Expected +HH:MM, -HH:MM or Z")]
    InvalidUtcOffset(String),

    #[error("Request timeout must be at least 1 second")]
    ZeroTimeout,
}

/// Locations of the three files a run reads and writes.
#[derive(Debug, Clone)]
pub struct MetricsPaths {
    pub dir: PathBuf,
    pub snapshot: PathBuf,
    pub events: PathBuf,
    pub marker: PathBuf,
}

impl MetricsPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            snapshot: dir.join(SNAPSHOT_FILE),
            events: dir.join(EVENTS_FILE),
            marker: dir.join(MARKER_FILE),
        }
    }
}

/// Validated settings for a poll run.
pub struct PollConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub api_base: String,
    pub timeout: Duration,
    pub paths: MetricsPaths,
    pub offset: FixedOffset,
}

impl std::fmt::Debug for PollConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("paths", &self.paths)
            .field("offset", &self.offset)
            .finish()
    }
}

impl PollConfig {
    /// Check that every required setting is present before anything touches
    /// the network or the filesystem. All missing names are reported at once.
    pub fn from_args(
        args: PollArgs,
        metrics_dir: &str,
        utc_offset: &str,
    ) -> Result<Self, ConfigError> {
        let owner = non_empty(args.owner);
        let repo = non_empty(args.repo);
        let token = non_empty(args.token);

        let mut names = Vec::new();
        if owner.is_none() {
            names.push("OWNER");
        }
        if repo.is_none() {
            names.push("REPO");
        }
        if token.is_none() {
            names.push("GITHUB_TOKEN");
        }

        match (owner, repo, token) {
            (Some(_), Some(_), Some(_)) if args.timeout_secs == 0 => Err(ConfigError::ZeroTimeout),
            (Some(owner), Some(repo), Some(token)) => Ok(Self {
                owner,
                repo,
                token,
                api_base: args.api_base.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(args.timeout_secs),
                paths: MetricsPaths::new(&expand_tilde(metrics_dir)),
                offset: parse_utc_offset(utc_offset)?,
            }),
            _ => Err(ConfigError::Missing { names }),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z` / `UTC`) into a fixed offset.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidUtcOffset(s.to_string());
    let s_trim = s.trim();
    if s_trim.eq_ignore_ascii_case("z") || s_trim.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match s_trim.as_bytes().first() {
        Some(b'+') => (1, &s_trim[1..]),
        Some(b'-') => (-1, &s_trim[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "00"));
    let two_digits = |p: &str| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
