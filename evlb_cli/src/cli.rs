//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "evlb", version, about = "EV charger dynamic load balancer")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/evlb.toml")]
    pub config: PathBuf,

    /// Emit JSON lines (decisions, logs and errors) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the config and print the effective parameters
    Check,
    /// Replay a CSV event trace against a simulated charger
    Replay {
        /// Trace file with `t_s,event,value` columns
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
    },
    /// Balance live: one meter reading (W) or command per stdin line
    Watch,
}
