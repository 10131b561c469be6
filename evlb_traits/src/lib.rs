pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::fmt;
use std::time::Instant;

/// Error type used at every collaborator boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raw value reported by the power meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterValue {
    /// Total household draw in Watts, EV included.
    Watts(f64),
    Unavailable,
    Unknown,
}

/// A single power-meter observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub timestamp: Instant,
    pub value: MeterValue,
}

impl PowerReading {
    pub fn watts(timestamp: Instant, watts: f64) -> Self {
        Self {
            timestamp,
            value: MeterValue::Watts(watts),
        }
    }

    pub fn unavailable(timestamp: Instant) -> Self {
        Self {
            timestamp,
            value: MeterValue::Unavailable,
        }
    }

    pub fn unknown(timestamp: Instant) -> Self {
        Self {
            timestamp,
            value: MeterValue::Unknown,
        }
    }
}

/// Optional charger status signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingActivity {
    Charging,
    NotCharging,
    Unknown,
}

/// Categories of actuator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
    SetCurrent,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start_charging",
            Command::Stop => "stop_charging",
            Command::SetCurrent => "set_current",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of power-meter readings, read on demand (timer-driven re-evaluation).
pub trait PowerSource {
    fn read(&mut self) -> Result<PowerReading, BoxError>;
}

/// Source of the optional charging-activity signal.
pub trait ActivitySource {
    fn activity(&mut self) -> ChargingActivity;
}

/// Charger control surface. Each call blocks until the charger has responded.
pub trait Actuator {
    fn start(&mut self, charger_id: &str) -> Result<(), BoxError>;
    fn stop(&mut self, charger_id: &str) -> Result<(), BoxError>;
    fn set_current(&mut self, charger_id: &str, amps: f64, watts: f64) -> Result<(), BoxError>;

    /// Whether the given command is wired up. Unsupported commands are skipped.
    fn supports(&self, _command: Command) -> bool {
        true
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn start(&mut self, charger_id: &str) -> Result<(), BoxError> {
        (**self).start(charger_id)
    }

    fn stop(&mut self, charger_id: &str) -> Result<(), BoxError> {
        (**self).stop(charger_id)
    }

    fn set_current(&mut self, charger_id: &str, amps: f64, watts: f64) -> Result<(), BoxError> {
        (**self).set_current(charger_id, amps, watts)
    }

    fn supports(&self, command: Command) -> bool {
        (**self).supports(command)
    }
}
