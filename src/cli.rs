use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "release-download-logger",
    about = "Log download counts for the latest GitHub release"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Directory holding the snapshot log, event log and last-poll marker
    #[arg(long, default_value = "metrics", global = true)]
    pub metrics_dir: String,

    /// UTC offset used for timestamps (e.g. +09:00, -05:00, Z)
    #[arg(long, default_value = "+09:00", global = true, allow_hyphen_values = true)]
    pub utc_offset: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch current counts and append snapshot and event rows (default)
    Poll(PollArgs),

    /// Show the last poll time and the most recent count per asset
    Status,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Repository owner
    #[arg(long, env = "OWNER")]
    pub owner: Option<String>,

    /// Repository name
    #[arg(long, env = "REPO")]
    pub repo: Option<String>,

    /// GitHub access token.
    /// WARNING: passing via --token is visible in process listings.
    /// Prefer the GITHUB_TOKEN environment variable instead.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub api_base: String,

    /// Timeout for the release request, in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,
}

impl Cli {
    /// The subcommand to run; a bare invocation polls using env configuration.
    pub fn effective_command(&self) -> Command {
        match &self.command {
            Some(cmd) => cmd.clone(),
            None => Command::Poll(PollArgs::from_env()),
        }
    }
}

impl PollArgs {
    /// Poll arguments populated only from env/defaults, for the bare invocation.
    fn from_env() -> Self {
        #[derive(Parser)]
        struct Bare {
            #[command(flatten)]
            poll: PollArgs,
        }
        Bare::parse_from(["release-download-logger"]).poll
    }
}
