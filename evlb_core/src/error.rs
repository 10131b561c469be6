use evlb_traits::Command;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BalancerError {
    #[error("sensor reading out of range: {watts} W")]
    SensorInvalid { watts: f64 },
    #[error("power meter unavailable")]
    SensorUnavailable,
    #[error("action {command} failed for charger {charger_id}: {message}")]
    ActionFailure {
        command: Command,
        charger_id: String,
        message: String,
    },
    #[error("configuration error: {0}")]
    ConfigurationInvalid(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing balancer parameters")]
    MissingParameters,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
