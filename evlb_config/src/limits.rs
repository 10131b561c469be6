//! Accepted ranges for every tunable.
//!
//! Shared by `Config::validate` and the runtime parameter setter so a value
//! that loads from TOML is always one the live balancer accepts.

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN and infinities are never contained.
    pub fn contains(&self, v: f64) -> bool {
        v.is_finite() && v >= self.min && v <= self.max
    }
}

pub const VOLTAGE_V: Range = Range::new(100.0, 480.0);
pub const MAX_SERVICE_CURRENT_A: Range = Range::new(1.0, 1000.0);
/// 0 is the hard-off switch.
pub const MAX_CHARGER_CURRENT_A: Range = Range::new(0.0, 80.0);
pub const MIN_EV_CURRENT_A: Range = Range::new(1.0, 32.0);
pub const RAMP_UP_TIME_S: Range = Range::new(0.0, 3600.0);
pub const OVERLOAD_TRIGGER_DELAY_S: Range = Range::new(1.0, 600.0);
pub const OVERLOAD_LOOP_INTERVAL_S: Range = Range::new(1.0, 600.0);
pub const FALLBACK_CURRENT_A: Range = Range::new(0.0, 80.0);

/// Readings above this are treated as sensor errors (W).
pub const MAX_POWER_METER_W: f64 = 200_000.0;

pub const MAX_ACTION_RETRIES: u32 = 10;
