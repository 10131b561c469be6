//! `evlb replay`: drive the balancer through a CSV trace on a simulated clock.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use evlb_config::{Config, TraceEvent, TraceRow};
use evlb_core::{Balancer, BalancerBuilder, Message, Outcome, ParameterName, Reason};
use evlb_hardware::{LoggingActuator, SimulatedActivity, SimulatedMeter};
use evlb_traits::{ChargingActivity, Clock, ManualClock, MeterValue, PowerReading};
use eyre::Result;

use crate::error_fmt::CliError;
use crate::report::{self, Trigger};

struct Replay {
    rt: Balancer,
    clock: ManualClock,
    meter: SimulatedMeter,
    activity: SimulatedActivity,
    json: bool,
}

pub fn run(cfg: &Config, trace: &Path, json: bool) -> Result<()> {
    let rows = evlb_config::load_trace(trace).map_err(|e| CliError::Trace {
        path: trace.display().to_string(),
        message: e.to_string(),
    })?;

    let clock = ManualClock::new();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let meter = SimulatedMeter::new(shared.clone());
    let activity = SimulatedActivity::new();
    let actuator = LoggingActuator::new().with_commands(
        cfg.actions.start_charging,
        cfg.actions.stop_charging,
        cfg.actions.set_current,
    );

    let rt = BalancerBuilder::from_config(cfg)
        .with_actuator(actuator)
        .with_clock(shared)
        .with_power_source(meter.clone())
        .with_activity_source(activity.clone())
        .build()?;

    tracing::info!(rows = rows.len(), trace = %trace.display(), "replay start");
    let mut replay = Replay {
        rt,
        clock,
        meter,
        activity,
        json,
    };
    let origin = replay.clock.now();
    for row in &rows {
        replay.fire_timers_until(origin, row.t_s);
        replay.clock.advance_to(origin + Duration::from_secs_f64(row.t_s));
        replay.apply(row);
    }

    let state = replay.rt.state();
    tracing::info!(
        current_a = state.current_set_a,
        state = state.balancer_state.as_str(),
        failures = replay.rt.diagnostics().failure_count,
        "replay done"
    );
    Ok(())
}

impl Replay {
    /// Fire overload timers due at or before `t_s`, each at its own instant.
    fn fire_timers_until(&mut self, origin: std::time::Instant, t_s: f64) {
        let until = origin + Duration::from_secs_f64(t_s);
        while let Some(due) = self.rt.next_deadline() {
            if due > until {
                break;
            }
            self.clock.advance_to(due);
            let out = self.rt.poll_timers();
            let at = due.saturating_duration_since(origin).as_secs_f64();
            self.emit(at, "timer", None, &out, None);
        }
    }

    fn apply(&mut self, row: &TraceRow) {
        let now = self.clock.now();
        let value = row.value.unwrap_or_default();
        let result = match row.event {
            TraceEvent::Power => {
                self.meter.set_watts(value);
                self.rt.handle(Message::Reading(PowerReading::watts(now, value)))
            }
            TraceEvent::Unavailable => {
                self.meter.set(MeterValue::Unavailable);
                self.rt.handle(Message::Reading(PowerReading::unavailable(now)))
            }
            TraceEvent::Unknown => {
                self.meter.set(MeterValue::Unknown);
                self.rt.handle(Message::Reading(PowerReading::unknown(now)))
            }
            TraceEvent::Charging => Ok(self.activity_changed(ChargingActivity::Charging)),
            TraceEvent::NotCharging => Ok(self.activity_changed(ChargingActivity::NotCharging)),
            TraceEvent::StatusUnknown => Ok(self.activity_changed(ChargingActivity::Unknown)),
            TraceEvent::MaxCharger => self.rt.set_parameter(ParameterName::MaxChargerCurrent, value),
            TraceEvent::MinEv => self.rt.set_parameter(ParameterName::MinEvCurrent, value),
            TraceEvent::RampUp => self.rt.set_parameter(ParameterName::RampUpTime, value),
            TraceEvent::Override => self.rt.manual_override(value),
            TraceEvent::Enable => Ok(self.rt.set_enabled(true)),
            TraceEvent::Disable => Ok(self.rt.set_enabled(false)),
            TraceEvent::Ready => Ok(self.rt.system_ready()),
        };
        let name = event_name(row.event);
        match result {
            Ok(out) => self.emit(row.t_s, name, row.value, &out, None),
            Err(e) => {
                tracing::warn!(event = name, error = %e, "trace row rejected");
                self.emit(row.t_s, name, row.value, &Outcome::default(), Some(&e.to_string()));
            }
        }
    }

    fn activity_changed(&mut self, activity: ChargingActivity) -> Outcome {
        self.activity.set(activity);
        self.rt.recompute(Reason::MeterUpdate)
    }

    fn emit(&self, t_s: f64, event: &str, value: Option<f64>, out: &Outcome, error: Option<&str>) {
        let trigger = Trigger { t_s, event, value };
        report::print(&trigger, out, self.rt.state(), error, self.json);
    }
}

fn event_name(e: TraceEvent) -> &'static str {
    match e {
        TraceEvent::Power => "power",
        TraceEvent::Unavailable => "unavailable",
        TraceEvent::Unknown => "unknown",
        TraceEvent::Charging => "charging",
        TraceEvent::NotCharging => "not_charging",
        TraceEvent::StatusUnknown => "status_unknown",
        TraceEvent::MaxCharger => "max_charger",
        TraceEvent::MinEv => "min_ev",
        TraceEvent::RampUp => "ramp_up",
        TraceEvent::Override => "override",
        TraceEvent::Enable => "enable",
        TraceEvent::Disable => "disable",
        TraceEvent::Ready => "ready",
    }
}
