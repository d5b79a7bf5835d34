//! CLI command definitions using clap.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// WebGame controller
#[derive(Parser, Debug)]
#[command(name = "webgame-controller")]
#[command(version)]
#[command(about = "Turns WebGame resources into a Deployment, Service and Ingress")]
#[command(
    long_about = "Watches WebGame resources and continuously converges their Deployment, Service and Ingress, publishing the reachable address in the WebGame status."
)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, env = "WEBGAME_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller against the current cluster
    Run(RunArgs),

    /// Print the WebGame CustomResourceDefinition as YAML
    Crd,
}

/// Options of the `run` command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Watch a single namespace instead of all of them
    #[arg(short, long, env = "WEBGAME_NAMESPACE")]
    pub namespace: Option<String>,

    /// Re-fetches per child after losing a write race
    #[arg(long, env = "WEBGAME_CONFLICT_RETRIES", default_value_t = 2)]
    pub conflict_retries: u32,

    /// Seconds before a failed record is retried
    #[arg(long, env = "WEBGAME_ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,
}

impl RunArgs {
    /// Delay before a failed record is retried.
    pub const fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}
