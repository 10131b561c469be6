//! Simulated collaborators for replay, demos and tests.
//!
//! Every device is a cheap handle around shared state: clone it, give one
//! copy to the balancer and drive or inspect the other.

pub mod actuator;
pub mod error;

pub use actuator::{ActuatorCall, LoggingActuator};
pub use error::HwError;

use std::sync::{Arc, Mutex, PoisonError};

use evlb_traits::{
    ActivitySource, BoxError, ChargingActivity, Clock, MeterValue, PowerReading, PowerSource,
};

/// Power meter whose value is set from outside.
#[derive(Clone)]
pub struct SimulatedMeter {
    value: Arc<Mutex<Option<MeterValue>>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimulatedMeter {
    /// Starts with no value; reads fail until the first `set`.
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
            clock,
        }
    }

    pub fn set(&self, value: MeterValue) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn set_watts(&self, watts: f64) {
        self.set(MeterValue::Watts(watts));
    }

    /// Make subsequent reads fail as if the meter link were down.
    pub fn disconnect(&self) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn current(&self) -> Option<MeterValue> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PowerSource for SimulatedMeter {
    fn read(&mut self) -> Result<PowerReading, BoxError> {
        let value = self.current().ok_or(HwError::Disconnected)?;
        tracing::trace!(?value, "simulated meter read");
        Ok(PowerReading {
            timestamp: self.clock.now(),
            value,
        })
    }
}

/// Charging-activity signal set from outside. Defaults to `Unknown`.
#[derive(Clone)]
pub struct SimulatedActivity {
    state: Arc<Mutex<ChargingActivity>>,
}

impl Default for SimulatedActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedActivity {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChargingActivity::Unknown)),
        }
    }

    pub fn set(&self, activity: ChargingActivity) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = activity;
    }
}

impl ActivitySource for SimulatedActivity {
    fn activity(&mut self) -> ChargingActivity {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlb_traits::ManualClock;

    #[test]
    fn meter_fails_until_set() {
        let clock = ManualClock::new();
        let mut meter = SimulatedMeter::new(Arc::new(clock.clone()));
        assert!(meter.read().is_err());

        meter.set_watts(1234.0);
        let r = meter.read().expect("value set");
        assert_eq!(r.value, MeterValue::Watts(1234.0));
        assert_eq!(r.timestamp, clock.now());

        meter.disconnect();
        assert!(meter.read().is_err());
    }

    #[test]
    fn activity_clones_share_state() {
        let a = SimulatedActivity::new();
        let mut b = a.clone();
        assert_eq!(b.activity(), ChargingActivity::Unknown);
        a.set(ChargingActivity::NotCharging);
        assert_eq!(b.activity(), ChargingActivity::NotCharging);
    }
}
