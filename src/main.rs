//! release-download-logger: incremental download metrics for a GitHub release.
//!
//! Each invocation fetches the cumulative download count of every asset in a
//! repository's latest release, appends a snapshot row per asset, attributes
//! positive deltas to the window since the previous poll, and records the
//! poll time. Meant to be run from a scheduler; no state lives in the process
//! between runs.

#![warn(clippy::all)]

mod cli;
mod config;
mod github;
mod metrics;
mod poll;
mod status;
mod types;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{MetricsPaths, PollConfig};

/// Run the poll command.
async fn run_poll(args: cli::PollArgs, metrics_dir: &str, utc_offset: &str) -> anyhow::Result<()> {
    let config = PollConfig::from_args(args, metrics_dir, utc_offset)?;
    tracing::debug!(?config, "Validated configuration");

    let client = github::GitHubClient::new(&config.api_base, &config.token, config.timeout)?;
    let now = Utc::now().with_timezone(&config.offset);

    let summary = poll::run_poll(&client, &config.owner, &config.repo, &config.paths, now)
        .await
        .map_err(|e| {
            let status = e
                .downcast_ref::<github::FetchError>()
                .and_then(github::FetchError::status);
            match status {
                Some(401) | Some(403) => {
                    e.context("Check that GITHUB_TOKEN is valid and can read the repository")
                }
                Some(404) => e.context(format!(
                    "No published release found for {}/{}",
                    config.owner, config.repo
                )),
                _ => e,
            }
        })?;

    if let Some(backup) = &summary.relocated {
        println!("Backed up stale snapshot log -> {}", backup.display());
    }
    println!(
        "Wrote snapshot rows: {} -> {}",
        summary.snapshot_rows,
        config.paths.snapshot.display()
    );
    if summary.first_poll {
        println!(
            "Wrote event rows: 0 -> {} (first poll, no window yet)",
            config.paths.events.display()
        );
    } else {
        println!(
            "Wrote event rows: {} -> {}",
            summary.event_rows,
            config.paths.events.display()
        );
    }
    println!("Updated last poll -> {}", config.paths.marker.display());
    tracing::info!(
        tag = %summary.release_tag,
        snapshot_rows = summary.snapshot_rows,
        event_rows = summary.event_rows,
        "Poll complete"
    );
    Ok(())
}

/// Run the status command.
fn run_status(metrics_dir: &str, utc_offset: &str) -> anyhow::Result<()> {
    let offset = config::parse_utc_offset(utc_offset)?;
    let paths = MetricsPaths::new(&config::expand_tilde(metrics_dir));

    let Some(report) = status::status_report(&paths, &offset)? else {
        println!("No metrics found in {}", paths.dir.display());
        println!("Run a poll first to create them.");
        return Ok(());
    };

    println!("Metrics directory: {}", paths.dir.display());
    match &report.last_poll {
        Some(at) => println!("Last poll: {}", metrics::format_timestamp(at)),
        None => println!("Last poll: never"),
    }

    if let Some(found) = &report.stale_header {
        println!(
            "Snapshot log header is out of date ({}); it will be backed up on the next poll.",
            found.join(",")
        );
        return Ok(());
    }

    println!();
    println!("Assets ({}):", report.counts.len());
    for (name, total) in &report.counts {
        println!("  {:<40} {}", name, total);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.effective_command() {
        Command::Poll(args) => run_poll(args, &cli.metrics_dir, &cli.utc_offset).await,
        Command::Status => run_status(&cli.metrics_dir, &cli.utc_offset),
    }
}
