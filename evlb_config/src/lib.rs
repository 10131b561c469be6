#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the load balancer.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `limits` holds the accepted range of every tunable; the runtime
//!   parameter setter checks against the same table.
//! - `trace` loads CSV event traces for offline replay.
use serde::Deserialize;

pub mod limits;
pub mod trace;

pub use trace::{TraceEvent, TraceRow, load_trace, parse_trace};

#[derive(Debug, Deserialize, Clone)]
pub struct Site {
    /// Nominal supply voltage (V).
    pub voltage_v: f64,
    /// Service breaker / fuse rating (A).
    pub max_service_current_a: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChargerCfg {
    /// Identifier passed to every actuator call.
    pub id: String,
    /// Per-charger ceiling (A). 0 keeps the charger off.
    pub max_current_a: f64,
    /// Below this the charger is stopped rather than throttled (A).
    pub min_current_a: f64,
}

impl Default for ChargerCfg {
    fn default() -> Self {
        Self {
            id: "charger_1".to_string(),
            max_current_a: 32.0,
            min_current_a: 6.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BalancerCfg {
    pub enabled: bool,
    /// Cooldown after a reduction before the current may rise again (s).
    pub ramp_up_time_s: u64,
    /// Delay before the first overload correction (s).
    pub overload_trigger_delay_s: u64,
    /// Period of the overload correction loop (s).
    pub overload_loop_interval_s: u64,
    /// Defer meter health evaluation until the host reports readiness.
    pub await_ready: bool,
}

impl Default for BalancerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            ramp_up_time_s: 30,
            overload_trigger_delay_s: 2,
            overload_loop_interval_s: 5,
            await_ready: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableBehavior {
    #[default]
    Stop,
    Ignore,
    SetCurrent,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MeterCfg {
    /// What to do while the power meter is unavailable: "stop" | "ignore" | "set_current"
    pub unavailable_behavior: UnavailableBehavior,
    /// Current applied in "set_current" mode (A), capped at the charger maximum.
    pub fallback_current_a: f64,
}

impl Default for MeterCfg {
    fn default() -> Self {
        Self {
            unavailable_behavior: UnavailableBehavior::Stop,
            fallback_current_a: 6.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActionsCfg {
    /// Which charger commands are wired up; unconfigured ones are skipped.
    pub start_charging: bool,
    pub stop_charging: bool,
    pub set_current: bool,
    /// Extra attempts after a failed command.
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry (ms).
    pub retry_base_delay_ms: u64,
}

impl Default for ActionsCfg {
    fn default() -> Self {
        Self {
            start_charging: true,
            stop_charging: true,
            set_current: true,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub site: Site,
    #[serde(default)]
    pub charger: ChargerCfg,
    #[serde(default)]
    pub balancer: BalancerCfg,
    #[serde(default)]
    pub meter: MeterCfg,
    #[serde(default)]
    pub actions: ActionsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file without validating it.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        use limits::*;

        // Site
        check_range("site.voltage_v", self.site.voltage_v, VOLTAGE_V)?;
        check_range(
            "site.max_service_current_a",
            self.site.max_service_current_a,
            MAX_SERVICE_CURRENT_A,
        )?;

        // Charger
        if self.charger.id.trim().is_empty() {
            eyre::bail!("charger.id must not be empty");
        }
        check_range(
            "charger.max_current_a",
            self.charger.max_current_a,
            MAX_CHARGER_CURRENT_A,
        )?;
        check_range(
            "charger.min_current_a",
            self.charger.min_current_a,
            MIN_EV_CURRENT_A,
        )?;

        // Balancer
        check_range(
            "balancer.ramp_up_time_s",
            self.balancer.ramp_up_time_s as f64,
            RAMP_UP_TIME_S,
        )?;
        check_range(
            "balancer.overload_trigger_delay_s",
            self.balancer.overload_trigger_delay_s as f64,
            OVERLOAD_TRIGGER_DELAY_S,
        )?;
        check_range(
            "balancer.overload_loop_interval_s",
            self.balancer.overload_loop_interval_s as f64,
            OVERLOAD_LOOP_INTERVAL_S,
        )?;

        // Meter
        check_range(
            "meter.fallback_current_a",
            self.meter.fallback_current_a,
            FALLBACK_CURRENT_A,
        )?;

        // Actions
        if self.actions.max_retries > MAX_ACTION_RETRIES {
            eyre::bail!("actions.max_retries must be <= {MAX_ACTION_RETRIES}");
        }
        if self.actions.retry_base_delay_ms > 60_000 {
            eyre::bail!("actions.retry_base_delay_ms is unreasonably large (>60s)");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot}");
            }
        }

        Ok(())
    }
}

fn check_range(name: &str, value: f64, range: limits::Range) -> eyre::Result<()> {
    if !range.contains(value) {
        eyre::bail!(
            "{name} must be in [{}, {}], got {value}",
            range.min,
            range.max
        );
    }
    Ok(())
}
