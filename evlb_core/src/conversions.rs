//! Conversions from `evlb_config` types into core types.

use std::time::Duration;

use evlb_config::{ActionsCfg, Config, UnavailableBehavior};

use crate::builder::{BalancerBuilder, Missing, Set};
use crate::executor::RetryPolicy;
use crate::params::{BalancerParameters, UnavailableMode};

impl From<&evlb_config::MeterCfg> for UnavailableMode {
    fn from(m: &evlb_config::MeterCfg) -> Self {
        match m.unavailable_behavior {
            UnavailableBehavior::Stop => UnavailableMode::Stop,
            UnavailableBehavior::Ignore => UnavailableMode::Ignore,
            UnavailableBehavior::SetCurrent => UnavailableMode::SetCurrent {
                fallback_a: m.fallback_current_a,
            },
        }
    }
}

impl From<&Config> for BalancerParameters {
    fn from(c: &Config) -> Self {
        Self {
            supply_voltage_v: c.site.voltage_v,
            max_service_current_a: c.site.max_service_current_a,
            max_charger_current_a: c.charger.max_current_a,
            min_ev_current_a: c.charger.min_current_a,
            ramp_up_time_s: c.balancer.ramp_up_time_s,
            overload_trigger_delay_s: c.balancer.overload_trigger_delay_s,
            overload_loop_interval_s: c.balancer.overload_loop_interval_s,
            unavailable_mode: UnavailableMode::from(&c.meter),
        }
    }
}

impl From<&ActionsCfg> for RetryPolicy {
    fn from(a: &ActionsCfg) -> Self {
        Self {
            max_retries: a.max_retries,
            base_delay: Duration::from_millis(a.retry_base_delay_ms),
        }
    }
}

impl BalancerBuilder<Missing, Missing> {
    /// Builder pre-filled from a loaded config. Only the actuator (and any
    /// optional sources) remain to be supplied.
    pub fn from_config(cfg: &Config) -> BalancerBuilder<Missing, Set> {
        BalancerBuilder::default()
            .with_charger_id(cfg.charger.id.clone())
            .with_retry(RetryPolicy::from(&cfg.actions))
            .await_ready(cfg.balancer.await_ready)
            .enabled(cfg.balancer.enabled)
            .with_parameters(BalancerParameters::from(cfg))
    }
}
