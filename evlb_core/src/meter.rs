//! Power meter health classification and the unavailable-meter policy.

use evlb_config::limits::MAX_POWER_METER_W;
use evlb_traits::MeterValue;

use crate::arithmetic::clamp_current;
use crate::params::UnavailableMode;

/// Classification of a single meter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterHealth {
    Valid(f64),
    /// Outside `0..=200 kW` or not a number.
    Invalid(f64),
    Unavailable,
    Unknown,
}

impl MeterHealth {
    pub fn is_valid(&self) -> bool {
        matches!(self, MeterHealth::Valid(_))
    }

    /// Unavailable or Unknown: the fallback policy applies.
    pub fn is_missing(&self) -> bool {
        matches!(self, MeterHealth::Unavailable | MeterHealth::Unknown)
    }
}

pub fn classify(value: &MeterValue) -> MeterHealth {
    match *value {
        MeterValue::Watts(w) if w.is_finite() && (0.0..=MAX_POWER_METER_W).contains(&w) => {
            MeterHealth::Valid(w)
        }
        MeterValue::Watts(w) => MeterHealth::Invalid(w),
        MeterValue::Unavailable => MeterHealth::Unavailable,
        MeterValue::Unknown => MeterHealth::Unknown,
    }
}

/// What the balancer last concluded about the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeterStatus {
    /// No usable reading seen yet.
    #[default]
    Pending,
    Healthy,
    Unavailable,
}

/// Target current when the meter goes missing. `None` means keep the
/// current set-point (ignore mode).
pub fn resolve_fallback_current(mode: UnavailableMode, max_charger_a: f64) -> Option<f64> {
    match mode {
        UnavailableMode::Stop => Some(0.0),
        UnavailableMode::Ignore => None,
        UnavailableMode::SetCurrent { fallback_a } => Some(fallback_a.min(max_charger_a)),
    }
}

/// Re-apply the fallback policy after a parameter change while the meter
/// is still missing. Ignore mode re-clamps the held set-point into the new
/// limits and stops if it no longer fits.
pub fn fallback_reapply(
    mode: UnavailableMode,
    max_charger_a: f64,
    current_set_a: f64,
    min_ev_a: f64,
) -> f64 {
    match resolve_fallback_current(mode, max_charger_a) {
        Some(a) => a,
        None if current_set_a <= 0.0 => 0.0,
        None => clamp_current(current_set_a, min_ev_a, max_charger_a).unwrap_or(0.0),
    }
}
