#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
//! `evlb`: command-line front end for the load balancer.

mod check;
mod cli;
mod error_fmt;
mod logging;
mod replay;
mod report;
mod watch;

use std::path::Path;

use clap::Parser;
use eyre::Result;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init(&cli.log_level, cli.json, None);
            return Err(e);
        }
    };
    logging::init(&cli.log_level, cli.json, Some(&cfg.logging));
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Check => check::run(&cfg, &cli.config, cli.json),
        Commands::Replay { trace } => replay::run(&cfg, &trace, cli.json),
        Commands::Watch => watch::run(&cfg, cli.json),
    }
}

/// Read, parse and validate the config, tagging failures for the exit code.
fn load_config(path: &Path) -> Result<evlb_config::Config> {
    let tag = |e: eyre::Report| CliError::Config {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let cfg = evlb_config::load_file(path).map_err(tag)?;
    cfg.validate().map_err(tag)?;
    Ok(cfg)
}
