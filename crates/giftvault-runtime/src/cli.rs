//! CLI definition using clap derive.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use giftvault_source_poller::PollerConfig;

#[derive(Parser)]
#[command(
    name = "giftvault",
    version,
    about = "Gift ownership reconciliation cache for a Telegram business account"
)]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/giftvault/giftvaultd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (update stream + reconciliation poller + UDS server)
    Daemon(DaemonOpts),
    /// Show daemon status summary
    Status(OutputOpts),
    /// List stored gifts
    Gifts(GiftsOpts),
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Bot API token
    #[arg(long, env = "GIFTS_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Directory holding gifts.json and bc_id.txt
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Business connection id to poll with; overrides the cached one
    #[arg(long, env = "BUSINESS_CONNECTION_ID")]
    pub connection_id: Option<String>,

    /// Seconds between reconciliation polls
    #[arg(
        long,
        env = "GIFTVAULT_POLL_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_secs: u64,

    /// Seconds before the first reconciliation poll
    #[arg(long, env = "GIFTVAULT_FIRST_POLL_DELAY_SECS", default_value_t = 10)]
    pub first_poll_delay_secs: u64,

    /// Maximum gifts fetched per poll
    #[arg(
        long,
        env = "GIFTVAULT_POLL_LIMIT",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub poll_limit: u32,

    /// Cap on ticks skipped after repeated poll failures (0 = retry every tick)
    #[arg(long, env = "GIFTVAULT_MAX_BACKOFF_TICKS", default_value_t = 8)]
    pub max_backoff_ticks: u32,

    /// Unauthorized polls in a row before the connection id is reported stale (0 = never)
    #[arg(long, env = "GIFTVAULT_STALE_IDENTITY_THRESHOLD", default_value_t = 5)]
    pub stale_identity_threshold: u32,

    /// Bot API base URL
    #[arg(long, env = "GIFTVAULT_API_BASE_URL", default_value = giftvault_botapi::DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Do not mark gift messages read or reply to them
    #[arg(long)]
    pub no_ack: bool,
}

impl DaemonOpts {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            first_delay: Duration::from_secs(self.first_poll_delay_secs),
            limit: self.poll_limit,
            max_backoff_ticks: self.max_backoff_ticks,
            stale_identity_threshold: self.stale_identity_threshold,
        }
    }
}

#[derive(clap::Args, Default)]
pub struct OutputOpts {
    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct GiftsOpts {
    /// Only this owner's gifts
    #[arg(long)]
    pub owner: Option<String>,

    #[command(flatten)]
    pub output: OutputOpts,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/giftvault/giftvaultd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/giftvault-{user}/giftvaultd.sock")
}
