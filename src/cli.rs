use std::time::Duration;

use bookdepth::{BookConfig, Market, ReconnectPolicy, StreamConfig};
use clap::{Args, Parser, Subcommand};

/// depthscope: order book snapshots and live depth streams.
#[derive(Parser, Debug)]
#[command(name = "depthscope", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(flatten)]
    pub tuning: Tuning,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one snapshot (spot, then futures) and print the derived view
    View(ViewArgs),

    /// Maintain a live book from the diff stream and print views periodically
    Stream(StreamArgs),

    /// Live terminal dashboard of the streamed book
    Dashboard(DashboardArgs),
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Trading pair symbol (e.g. BTCUSDT)
    pub symbol: Option<String>,

    /// Market to try first
    #[arg(long, default_value = "spot")]
    pub market: Market,

    /// Output as JSON instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Trading pair symbol (e.g. btcusdt)
    pub symbol: String,

    /// Diff stream to follow
    #[arg(long, default_value = "futures")]
    pub market: Market,

    /// Print interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Output as JSON lines instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DashboardArgs {
    /// Trading pair symbol (e.g. btcusdt)
    pub symbol: String,

    /// Diff stream to follow
    #[arg(long, default_value = "futures")]
    pub market: Market,

    /// Store poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub refresh_ms: u64,
}

/// Session and request knobs shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Tuning {
    /// Handoff queue capacity (oldest messages are dropped on overflow)
    #[arg(long, default_value_t = 1024, global = true)]
    pub queue_capacity: usize,

    /// Give up after this many consecutive failed reconnects (default: never)
    #[arg(long, global = true)]
    pub max_reconnects: Option<u32>,

    /// Delay before reconnecting, in milliseconds
    #[arg(long, default_value_t = 5000, global = true)]
    pub reconnect_delay_ms: u64,

    /// Double the reconnect delay after each failure (capped at 60s, jittered)
    #[arg(long, global = true)]
    pub exponential_backoff: bool,

    /// Apply diffs without seeding from a snapshot or checking sequence ids
    #[arg(long, global = true)]
    pub no_seed: bool,

    /// REST request timeout in milliseconds
    #[arg(long, default_value_t = 10_000, global = true)]
    pub timeout_ms: u64,
}

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

impl Tuning {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let base = Duration::from_millis(self.reconnect_delay_ms);
        let policy = if self.exponential_backoff {
            ReconnectPolicy::exponential(base, MAX_RECONNECT_DELAY.max(base))
        } else {
            ReconnectPolicy::fixed(base)
        };
        policy.with_max_attempts(self.max_reconnects)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            queue_capacity: self.queue_capacity,
            seed_from_snapshot: !self.no_seed,
            reconnect: self.reconnect_policy(),
        }
    }

    /// Apply the request timeout on top of an env-derived config.
    pub fn apply(&self, mut config: BookConfig) -> BookConfig {
        config.request_timeout = Duration::from_millis(self.timeout_ms);
        config
    }
}
