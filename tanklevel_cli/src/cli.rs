//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "tanklevel", version, about = "Water tank telemetry node")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/tanklevel.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the telemetry loop until interrupted
    Run {
        /// Override the interval between read cycles (ms)
        #[arg(long, value_name = "MS")]
        read_interval_ms: Option<u64>,
        /// Stop after this many published readings (smoke tests)
        #[arg(long, value_name = "N")]
        cycles: Option<u32>,
    },
    /// Take one reading and print it as JSON without publishing
    Read,
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
