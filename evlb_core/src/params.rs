//! Runtime-tunable balancer parameters.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use evlb_config::limits::{self, Range};
use evlb_traits::BoxError;

use crate::error::{BalancerError, Result};

/// Policy applied while the power meter has no valid reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum UnavailableMode {
    /// Force 0 A.
    #[default]
    Stop,
    /// Keep whatever is currently set.
    Ignore,
    /// Apply a fixed current, capped at the charger maximum.
    SetCurrent { fallback_a: f64 },
}

impl UnavailableMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableMode::Stop => "stop",
            UnavailableMode::Ignore => "ignore",
            UnavailableMode::SetCurrent { .. } => "set_current",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancerParameters {
    pub supply_voltage_v: f64,
    pub max_service_current_a: f64,
    /// 0 keeps the charger off regardless of headroom.
    pub max_charger_current_a: f64,
    pub min_ev_current_a: f64,
    pub ramp_up_time_s: u64,
    pub overload_trigger_delay_s: u64,
    pub overload_loop_interval_s: u64,
    pub unavailable_mode: UnavailableMode,
}

impl Default for BalancerParameters {
    fn default() -> Self {
        Self {
            supply_voltage_v: 230.0,
            max_service_current_a: 32.0,
            max_charger_current_a: 32.0,
            min_ev_current_a: 6.0,
            ramp_up_time_s: 30,
            overload_trigger_delay_s: 2,
            overload_loop_interval_s: 5,
            unavailable_mode: UnavailableMode::Stop,
        }
    }
}

impl BalancerParameters {
    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs(self.ramp_up_time_s)
    }

    pub fn overload_trigger_delay(&self) -> Duration {
        Duration::from_secs(self.overload_trigger_delay_s)
    }

    pub fn overload_loop_interval(&self) -> Duration {
        Duration::from_secs(self.overload_loop_interval_s)
    }

    /// Hard-off switch engaged.
    pub fn is_hard_off(&self) -> bool {
        self.max_charger_current_a <= 0.0
    }

    /// Check every field against the shared limit table.
    pub fn validate(&self) -> Result<()> {
        check(
            ParameterName::SupplyVoltage,
            self.supply_voltage_v,
            limits::VOLTAGE_V,
        )?;
        check(
            ParameterName::MaxServiceCurrent,
            self.max_service_current_a,
            limits::MAX_SERVICE_CURRENT_A,
        )?;
        check(
            ParameterName::MaxChargerCurrent,
            self.max_charger_current_a,
            limits::MAX_CHARGER_CURRENT_A,
        )?;
        check(
            ParameterName::MinEvCurrent,
            self.min_ev_current_a,
            limits::MIN_EV_CURRENT_A,
        )?;
        check(
            ParameterName::RampUpTime,
            self.ramp_up_time_s as f64,
            limits::RAMP_UP_TIME_S,
        )?;
        check(
            ParameterName::OverloadTriggerDelay,
            self.overload_trigger_delay_s as f64,
            limits::OVERLOAD_TRIGGER_DELAY_S,
        )?;
        check(
            ParameterName::OverloadLoopInterval,
            self.overload_loop_interval_s as f64,
            limits::OVERLOAD_LOOP_INTERVAL_S,
        )?;
        if let UnavailableMode::SetCurrent { fallback_a } = self.unavailable_mode {
            check(
                ParameterName::FallbackCurrent,
                fallback_a,
                limits::FALLBACK_CURRENT_A,
            )?;
        }
        Ok(())
    }

    /// Copy of `self` with one parameter replaced. The result is validated
    /// as a whole; `self` is left untouched on error.
    pub fn with_parameter(&self, name: ParameterName, value: f64) -> Result<Self> {
        let mut next = *self;
        match name {
            ParameterName::SupplyVoltage => next.supply_voltage_v = value,
            ParameterName::MaxServiceCurrent => next.max_service_current_a = value,
            ParameterName::MaxChargerCurrent => next.max_charger_current_a = value,
            ParameterName::MinEvCurrent => next.min_ev_current_a = value,
            ParameterName::RampUpTime => next.ramp_up_time_s = whole_seconds(name, value)?,
            ParameterName::OverloadTriggerDelay => {
                next.overload_trigger_delay_s = whole_seconds(name, value)?;
            }
            ParameterName::OverloadLoopInterval => {
                next.overload_loop_interval_s = whole_seconds(name, value)?;
            }
            ParameterName::FallbackCurrent => match next.unavailable_mode {
                UnavailableMode::SetCurrent { .. } => {
                    next.unavailable_mode = UnavailableMode::SetCurrent { fallback_a: value };
                }
                _ => {
                    return Err(eyre::Report::new(BalancerError::ConfigurationInvalid(
                        format!(
                            "{name} only applies in set_current mode (mode is {})",
                            next.unavailable_mode.as_str()
                        ),
                    )));
                }
            },
        }
        next.validate()?;
        Ok(next)
    }
}

fn check(name: ParameterName, value: f64, range: Range) -> Result<()> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(eyre::Report::new(BalancerError::ConfigurationInvalid(
            format!("{name} must be in [{}, {}], got {value}", range.min, range.max),
        )))
    }
}

fn whole_seconds(name: ParameterName, value: f64) -> Result<u64> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(eyre::Report::new(BalancerError::ConfigurationInvalid(
            format!("{name} must be a whole number of seconds, got {value}"),
        )));
    }
    Ok(value as u64)
}

/// Parameters that can be changed while the balancer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterName {
    SupplyVoltage,
    MaxServiceCurrent,
    MaxChargerCurrent,
    MinEvCurrent,
    RampUpTime,
    OverloadTriggerDelay,
    OverloadLoopInterval,
    FallbackCurrent,
}

impl ParameterName {
    pub const ALL: [ParameterName; 8] = [
        ParameterName::SupplyVoltage,
        ParameterName::MaxServiceCurrent,
        ParameterName::MaxChargerCurrent,
        ParameterName::MinEvCurrent,
        ParameterName::RampUpTime,
        ParameterName::OverloadTriggerDelay,
        ParameterName::OverloadLoopInterval,
        ParameterName::FallbackCurrent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterName::SupplyVoltage => "supply_voltage",
            ParameterName::MaxServiceCurrent => "max_service_current",
            ParameterName::MaxChargerCurrent => "max_charger_current",
            ParameterName::MinEvCurrent => "min_ev_current",
            ParameterName::RampUpTime => "ramp_up_time",
            ParameterName::OverloadTriggerDelay => "overload_trigger_delay",
            ParameterName::OverloadLoopInterval => "overload_loop_interval",
            ParameterName::FallbackCurrent => "fallback_current",
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterName {
    type Err = BalancerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ParameterName::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| BalancerError::ConfigurationInvalid(format!("unknown parameter '{s}'")))
    }
}

/// External persistence for parameters. The balancer writes through on
/// every accepted change and reads once at startup.
pub trait ParameterStore {
    fn load(&self) -> Option<BalancerParameters>;
    fn store(&mut self, params: &BalancerParameters) -> std::result::Result<(), BoxError>;
}

/// Store that keeps the last written parameters in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    saved: Option<BalancerParameters>,
    writes: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(params: BalancerParameters) -> Self {
        Self {
            saved: Some(params),
            writes: 0,
        }
    }

    /// Number of successful `store` calls.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ParameterStore for InMemoryStore {
    fn load(&self) -> Option<BalancerParameters> {
        self.saved
    }

    fn store(&mut self, params: &BalancerParameters) -> std::result::Result<(), BoxError> {
        self.saved = Some(*params);
        self.writes += 1;
        Ok(())
    }
}
