//! Human-readable error descriptions and structured JSON error formatting.

use evlb_core::{BalancerError, BuildError};
use serde_json::json;
use thiserror::Error;

/// Failures that originate in the CLI itself.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("config {path}: {message}")]
    Config { path: String, message: String },
    #[error("trace {path}: {message}")]
    Trace { path: String, message: String },
    #[error("stdin line {line}: {message}")]
    Input { line: usize, message: String },
}

/// Stable exit codes. Usage errors exit with 2 from clap itself.
pub mod exit {
    pub const FAILURE: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const TRACE: i32 = 4;
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config { path, message } => format!(
                "What happened: The config file {path} could not be used ({message}).\nLikely causes: Wrong path, TOML syntax error, a missing [site] table or an out-of-range value.\nHow to fix: Run `evlb --config {path} check` and correct the reported field."
            ),
            CliError::Trace { path, message } => format!(
                "What happened: The trace file {path} could not be replayed ({message}).\nLikely causes: Header is not exactly `t_s,event,value`, an unknown event name, a missing value or timestamps going backwards.\nHow to fix: Fix the reported row and rerun."
            ),
            CliError::Input { line, message } => format!(
                "What happened: Input line {line} was not understood ({message}).\nHow to fix: Send a wattage, `unavailable`, `unknown`, `enable`, `disable`, `ready`, `override <A>` or `set <name> <value>`."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No charger actuator was provided to the balancer.\nHow to fix: Pass one via with_actuator(...).".to_string()
            }
            BuildError::MissingParameters => {
                "What happened: Balancer parameters were not set.\nHow to fix: Build from a config or call with_parameters(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `evlb check`."
            ),
        };
    }

    if let Some(BalancerError::ConfigurationInvalid(msg)) = err.downcast_ref::<BalancerError>() {
        return format!(
            "What happened: A balancer parameter was rejected ({msg}).\nHow to fix: Use a value inside the documented range."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {err}"
    )
}

pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config { .. } => exit::CONFIG,
            CliError::Trace { .. } | CliError::Input { .. } => exit::TRACE,
        };
    }
    if err.downcast_ref::<BuildError>().is_some()
        || matches!(
            err.downcast_ref::<BalancerError>(),
            Some(BalancerError::ConfigurationInvalid(_))
        )
    {
        return exit::CONFIG;
    }
    exit::FAILURE
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Config { .. }) => "Config",
        Some(CliError::Trace { .. }) => "Trace",
        Some(CliError::Input { .. }) => "Input",
        None if exit_code_for_error(err) == exit::CONFIG => "Config",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
