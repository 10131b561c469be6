//! Fault and resolution notifications for the host.

use std::fmt;

use evlb_traits::Command;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Meter lost while in stop mode; charging was halted.
    MeterUnavailable,
    /// Meter lost; fixed fallback current applied.
    FallbackActivated { amps: f64 },
    /// A meter-driven recompute stopped an active charger.
    OverloadStop { previous_a: f64, available_a: f64 },
    /// Charging restarted after a stop.
    ChargingResumed { amps: f64 },
    MeterRecovered,
    /// Reading rejected as out of range.
    SensorInvalid { watts: f64 },
    /// Actuator call failed after all retries.
    ActionFailed {
        kind: Command,
        charger_id: String,
        error: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::MeterUnavailable => "meter_unavailable",
            Notification::FallbackActivated { .. } => "fallback_activated",
            Notification::OverloadStop { .. } => "overload_stop",
            Notification::ChargingResumed { .. } => "charging_resumed",
            Notification::MeterRecovered => "meter_recovered",
            Notification::SensorInvalid { .. } => "sensor_invalid",
            Notification::ActionFailed { .. } => "action_failed",
        }
    }

    /// Fault notifications, as opposed to resolutions.
    pub fn is_fault(&self) -> bool {
        !matches!(
            self,
            Notification::ChargingResumed { .. } | Notification::MeterRecovered
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::MeterUnavailable => {
                write!(f, "power meter unavailable, charging stopped")
            }
            Notification::FallbackActivated { amps } => {
                write!(f, "power meter unavailable, fallback current {amps} A applied")
            }
            Notification::OverloadStop {
                previous_a,
                available_a,
            } => write!(
                f,
                "charging stopped from {previous_a} A, available current {available_a} A"
            ),
            Notification::ChargingResumed { amps } => write!(f, "charging resumed at {amps} A"),
            Notification::MeterRecovered => write!(f, "power meter recovered"),
            Notification::SensorInvalid { watts } => {
                write!(f, "power meter reading {watts} W rejected")
            }
            Notification::ActionFailed {
                kind,
                charger_id,
                error,
            } => write!(f, "{kind} failed for {charger_id}: {error}"),
        }
    }
}
