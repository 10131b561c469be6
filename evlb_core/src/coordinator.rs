//! The balancing decision as a pure state transition.
//!
//! [`recompute`] takes the current [`ChargerState`], one [`Event`] and the
//! parameters, and returns the next state together with everything the
//! outside world must do: actuator requests, timer commands and
//! notifications. It never performs I/O and never reads a clock; `now`
//! and the charging-activity signal come in through [`Context`].
//!
//! Per event the steps are:
//! 1. disabled: no-op, timers cancelled
//! 2. `max_charger_current_a == 0`: force 0 A
//! 3. meter health; a missing meter applies the fallback policy
//! 4. EV draw estimate, headroom, clamp
//! 5. ramp-up cooldown
//! 6. diff against the previous set-point into actuator requests
//! 7. overload timers
//! 8. record the reason

use std::fmt;
use std::time::Instant;

use evlb_traits::{ChargingActivity, PowerReading};
use tracing::{debug, info, warn};

use crate::activity::estimate_ev_draw;
use crate::arithmetic::{clamp_current, clamp_to_safe_output, compute_available_current, watts_for};
use crate::error::BalancerError;
use crate::executor::{ActionRequest, plan_actions};
use crate::meter::{MeterHealth, MeterStatus, classify, fallback_reapply, resolve_fallback_current};
use crate::notify::Notification;
use crate::overload::{OverloadScheduler, TimerCommand, TimerHandle, TimerKind};
use crate::params::{BalancerParameters, UnavailableMode};
use crate::ramp::{BalancerState, RampController, resolve_balancer_state};

/// Why the last set-point was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    MeterUpdate,
    ManualOverride,
    FallbackUnavailable,
    ParameterChange,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::MeterUpdate => "meter-update",
            Reason::ManualOverride => "manual-override",
            Reason::FallbackUnavailable => "fallback-unavailable",
            Reason::ParameterChange => "parameter-change",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// New meter value.
    Reading(PowerReading),
    /// Re-run with the last known reading (parameter change, host request).
    Refresh { reason: Reason },
    EnableChanged(bool),
    /// An overload timer fired. `reading` is the meter value read on
    /// demand, if a source is available.
    TimerFired {
        handle: TimerHandle,
        reading: Option<PowerReading>,
    },
    /// One-shot manual limit in Amps.
    ManualOverride(f64),
    /// Host finished starting; carries the meter value at that moment.
    SystemReady(Option<PowerReading>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Context {
    pub now: Instant,
    pub activity: Option<ChargingActivity>,
}

impl Context {
    pub fn at(now: Instant) -> Self {
        Self {
            now,
            activity: None,
        }
    }
}

/// Everything the balancer remembers between events.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargerState {
    /// Commanded current (A); 0 when stopped.
    pub current_set_a: f64,
    pub is_active: bool,
    /// Headroom from the last computation, rounded to 0.01 A.
    pub available_a: Option<f64>,
    pub last_action_reason: Option<Reason>,
    pub balancer_state: BalancerState,
    pub meter: MeterStatus,
    pub fallback_active: bool,
    pub enabled: bool,
    pub ready: bool,
    pub last_valid_watts: Option<f64>,
    /// Set-point in effect when `last_valid_watts` was sampled. The EV
    /// share of a stale reading is estimated from this, not from the
    /// set-point decided since.
    pub last_reading_set_a: Option<f64>,
    /// Set by `Shutdown`; no overload timer is armed afterwards.
    pub shut_down: bool,
    pub(crate) ramp: RampController,
    pub(crate) overload: OverloadScheduler,
}

impl Default for ChargerState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ChargerState {
    /// Fresh state. With `ready == false` a missing meter is not acted on
    /// until `SystemReady`.
    pub fn new(ready: bool) -> Self {
        Self {
            current_set_a: 0.0,
            is_active: false,
            available_a: None,
            last_action_reason: None,
            balancer_state: BalancerState::Stopped,
            meter: MeterStatus::Pending,
            fallback_active: false,
            enabled: true,
            ready,
            last_valid_watts: None,
            last_reading_set_a: None,
            shut_down: false,
            ramp: RampController::new(),
            overload: OverloadScheduler::new(),
        }
    }

    /// Seed the set-point from an externally persisted value. No actuator
    /// call is implied; the charger is assumed to be running at that value.
    pub fn restore(&mut self, current_set_a: f64) {
        let a = if current_set_a.is_finite() {
            current_set_a.max(0.0)
        } else {
            0.0
        };
        self.current_set_a = a;
        self.is_active = a > 0.0;
        self.last_reading_set_a = None;
        self.balancer_state = if !self.enabled {
            BalancerState::Disabled
        } else if self.is_active {
            BalancerState::Active
        } else {
            BalancerState::Stopped
        };
    }

    pub fn last_reduction_time(&self) -> Option<Instant> {
        self.ramp.last_reduction()
    }

    pub fn overload_trigger_armed(&self) -> bool {
        self.overload.trigger_armed()
    }

    pub fn overload_loop_armed(&self) -> bool {
        self.overload.loop_armed()
    }

    pub fn current_set_w(&self, voltage_v: f64) -> f64 {
        watts_for(self.current_set_a, voltage_v)
    }
}

/// Side effects requested by one transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub actions: Vec<ActionRequest>,
    pub timers: Vec<TimerCommand>,
    pub notifications: Vec<Notification>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.timers.is_empty() && self.notifications.is_empty()
    }
}

/// Apply one event.
pub fn recompute(
    state: &ChargerState,
    params: &BalancerParameters,
    charger_id: &str,
    event: Event,
    ctx: Context,
) -> (ChargerState, Transition) {
    let mut step = Step {
        s: state.clone(),
        t: Transition::default(),
        params,
        charger_id,
        ctx,
    };
    step.dispatch(event);
    (step.s, step.t)
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Headroom computation; carries the unrounded headroom.
    Compute(f64),
    /// Fallback on meter loss; fault notifications only when newly lost.
    Fallback { newly: bool },
    Other,
}

struct Step<'a> {
    s: ChargerState,
    t: Transition,
    params: &'a BalancerParameters,
    charger_id: &'a str,
    ctx: Context,
}

impl Step<'_> {
    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Reading(reading) => self.on_reading(reading),
            Event::Refresh { reason } => self.refresh(reason),
            Event::EnableChanged(enabled) => self.set_enabled(enabled),
            Event::TimerFired { handle, reading } => self.on_timer(handle, reading),
            Event::ManualOverride(amps) => self.manual_override(amps),
            Event::SystemReady(reading) => self.on_ready(reading),
            Event::Shutdown => {
                self.s.shut_down = true;
                self.s.overload.cancel_all(&mut self.t.timers);
            }
        }
    }

    fn on_reading(&mut self, reading: PowerReading) {
        match classify(&reading.value) {
            MeterHealth::Invalid(watts) => {
                warn!(
                    error = %BalancerError::SensorInvalid { watts },
                    "power meter reading ignored"
                );
                self.t
                    .notifications
                    .push(Notification::SensorInvalid { watts });
            }
            MeterHealth::Valid(watts) => {
                self.mark_healthy(watts);
                if self.skip_disabled() {
                    return;
                }
                if self.params.is_hard_off() {
                    self.hard_off(Reason::MeterUpdate);
                    return;
                }
                let available = self.compute(watts, Reason::MeterUpdate);
                self.track_overload(available);
            }
            MeterHealth::Unavailable | MeterHealth::Unknown => {
                if !self.s.ready {
                    debug!("power meter missing before system ready, deferred");
                    return;
                }
                self.meter_lost();
            }
        }
    }

    fn mark_healthy(&mut self, watts: f64) {
        // An unchanged value is the same sample seen again.
        let repeat = self.s.meter == MeterStatus::Healthy && self.s.last_valid_watts == Some(watts);
        if !repeat {
            self.s.last_reading_set_a = Some(self.s.current_set_a);
        }
        self.s.last_valid_watts = Some(watts);
        self.s.fallback_active = false;
        if self.s.meter == MeterStatus::Unavailable {
            info!(watts, "power meter recovered");
            self.t.notifications.push(Notification::MeterRecovered);
        }
        self.s.meter = MeterStatus::Healthy;
    }

    fn meter_lost(&mut self) {
        let newly = self.s.meter != MeterStatus::Unavailable;
        self.s.meter = MeterStatus::Unavailable;
        self.s.fallback_active = true;
        self.s.ramp.clear_history();
        self.s.overload.cancel_all(&mut self.t.timers);
        if self.skip_disabled() {
            return;
        }
        if self.params.is_hard_off() {
            self.hard_off(Reason::FallbackUnavailable);
            return;
        }
        self.apply_fallback(newly);
    }

    /// True (and state reported as Disabled) when balancing is off.
    fn skip_disabled(&mut self) -> bool {
        if self.s.enabled {
            return false;
        }
        debug!("load balancing disabled, skipping recompute");
        self.s.balancer_state = BalancerState::Disabled;
        true
    }

    fn hard_off(&mut self, reason: Reason) {
        self.s.overload.cancel_all(&mut self.t.timers);
        if self.s.current_set_a != 0.0 {
            debug!("max charger current is 0, forcing charger off");
        }
        self.commit(0.0, reason, false, Origin::Other);
    }

    fn apply_fallback(&mut self, newly: bool) {
        let mode = self.params.unavailable_mode;
        match resolve_fallback_current(mode, self.params.max_charger_current_a) {
            None => {
                if newly {
                    warn!(
                        error = %BalancerError::SensorUnavailable,
                        current_a = self.s.current_set_a,
                        "keeping last current"
                    );
                }
            }
            Some(amps) => {
                if newly {
                    warn!(
                        error = %BalancerError::SensorUnavailable,
                        amps,
                        mode = mode.as_str(),
                        "applying fallback"
                    );
                }
                self.s.available_a = Some(0.0);
                self.commit(amps, Reason::FallbackUnavailable, false, Origin::Fallback { newly });
            }
        }
    }

    /// Headroom computation for a valid reading. Returns the unrounded
    /// headroom for the overload timers.
    fn compute(&mut self, watts: f64, reason: Reason) -> f64 {
        let p = self.params;
        let now = self.ctx.now;
        let sampled_at_a = self.s.last_reading_set_a.unwrap_or(self.s.current_set_a);
        let ev_draw_a = estimate_ev_draw(self.ctx.activity, sampled_at_a);
        let available = compute_available_current(
            p.max_service_current_a,
            ev_draw_a,
            watts,
            p.supply_voltage_v,
        );
        let target =
            clamp_current(available, p.min_ev_current_a, p.max_charger_current_a).unwrap_or(0.0);

        if self.s.ramp.observe_available(available, p.min_ev_current_a, now) {
            debug!(available_a = available, "headroom shrank, cooldown restarted");
        }
        let decision = self.s.ramp.apply(self.s.current_set_a, target, now, p.ramp_up());

        debug!(
            reason = reason.as_str(),
            watts,
            ev_draw_a,
            available_a = available,
            target_a = target,
            final_a = decision.final_a,
            held = decision.held,
            "recompute"
        );

        self.s.available_a = Some(round2(available));
        self.commit(decision.final_a, reason, decision.held, Origin::Compute(available));
        available
    }

    fn track_overload(&mut self, available: f64) {
        if self.s.shut_down {
            debug!("balancer shut down, overload timers not armed");
            return;
        }
        self.s.overload.update(
            available,
            self.params.overload_trigger_delay(),
            &mut self.t.timers,
        );
    }

    fn refresh(&mut self, reason: Reason) {
        if self.skip_disabled() {
            return;
        }
        if self.params.is_hard_off() {
            self.hard_off(reason);
            return;
        }
        match self.s.meter {
            MeterStatus::Unavailable => {
                let p = self.params;
                let target = fallback_reapply(
                    p.unavailable_mode,
                    p.max_charger_current_a,
                    self.s.current_set_a,
                    p.min_ev_current_a,
                );
                self.s.fallback_active = true;
                if target != self.s.current_set_a {
                    debug!(
                        from_a = self.s.current_set_a,
                        to_a = target,
                        "fallback current updated after parameter change"
                    );
                    self.commit(target, reason, false, Origin::Other);
                }
            }
            MeterStatus::Healthy => {
                if let Some(watts) = self.s.last_valid_watts {
                    let available = self.compute(watts, reason);
                    self.track_overload(available);
                }
            }
            MeterStatus::Pending => {
                debug!("no meter reading yet, nothing to recompute");
            }
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.s.enabled = enabled;
        if enabled {
            info!("load balancing enabled");
            self.s.balancer_state = resolve_balancer_state(
                true,
                self.s.is_active,
                self.s.is_active,
                self.s.current_set_a,
                self.s.current_set_a,
                false,
            );
            self.refresh(Reason::ParameterChange);
        } else {
            info!("load balancing disabled");
            self.s.overload.cancel_all(&mut self.t.timers);
            self.s.balancer_state = BalancerState::Disabled;
        }
    }

    fn on_timer(&mut self, handle: TimerHandle, reading: Option<PowerReading>) {
        let Some(kind) = self.s.overload.accept_fire(handle) else {
            debug!(generation = handle.generation, "stale overload timer ignored");
            return;
        };
        if self.skip_disabled() {
            self.s.overload.cancel_all(&mut self.t.timers);
            return;
        }

        let watts = match reading.map(|r| classify(&r.value)) {
            Some(MeterHealth::Valid(w)) => {
                self.mark_healthy(w);
                Some(w)
            }
            Some(MeterHealth::Invalid(_)) | None => self.s.last_valid_watts,
            Some(MeterHealth::Unavailable | MeterHealth::Unknown) => None,
        };
        let Some(watts) = watts.filter(|_| self.s.meter == MeterStatus::Healthy) else {
            debug!("overload timer fired without a valid reading, cancelling");
            self.s.overload.cancel_all(&mut self.t.timers);
            return;
        };
        if self.params.is_hard_off() {
            self.hard_off(Reason::MeterUpdate);
            return;
        }

        let available = self.compute(watts, Reason::MeterUpdate);
        match kind {
            TimerKind::OverloadTrigger => {
                if available < 0.0 {
                    debug!(
                        available_a = available,
                        interval_s = self.params.overload_loop_interval_s,
                        "overload persists, correction loop started"
                    );
                }
                self.s.overload.after_trigger_fire(
                    available,
                    self.params.overload_loop_interval(),
                    &mut self.t.timers,
                );
            }
            TimerKind::OverloadLoop => {
                if available >= 0.0 {
                    debug!("overload cleared, correction loop stopped");
                }
                self.s.overload.after_loop_fire(available, &mut self.t.timers);
            }
        }
    }

    fn manual_override(&mut self, amps: f64) {
        let p = self.params;
        let target = clamp_current(amps, p.min_ev_current_a, p.max_charger_current_a).unwrap_or(0.0);
        debug!(requested_a = amps, target_a = target, "manual override");
        self.commit(target, Reason::ManualOverride, false, Origin::Other);
    }

    fn on_ready(&mut self, reading: Option<PowerReading>) {
        if self.s.ready {
            return;
        }
        self.s.ready = true;
        match reading.map(|r| classify(&r.value)) {
            Some(MeterHealth::Valid(_)) => {
                if let Some(r) = reading {
                    self.on_reading(r);
                }
            }
            Some(MeterHealth::Invalid(watts)) => {
                warn!(
                    error = %BalancerError::SensorInvalid { watts },
                    "power meter reading ignored at startup"
                );
                self.t
                    .notifications
                    .push(Notification::SensorInvalid { watts });
            }
            Some(MeterHealth::Unavailable | MeterHealth::Unknown) | None => {
                if self.s.meter == MeterStatus::Healthy {
                    // A valid reading already arrived before readiness.
                    return;
                }
                self.meter_lost();
            }
        }
    }

    /// Commit a new set-point: safety clamp, state, notifications, actions.
    fn commit(&mut self, target_a: f64, reason: Reason, held: bool, origin: Origin) {
        let p = self.params;
        let safe = clamp_to_safe_output(target_a, p.max_charger_current_a, p.max_service_current_a);
        if safe != target_a {
            warn!(
                requested_a = target_a,
                safe_a = safe,
                max_charger_a = p.max_charger_current_a,
                max_service_a = p.max_service_current_a,
                "output exceeds safe maximum, clamped"
            );
        }

        let prev_a = self.s.current_set_a;
        let prev_active = self.s.is_active;
        let active = safe > 0.0;

        self.s.current_set_a = safe;
        self.s.is_active = active;
        self.s.last_action_reason = Some(reason);
        self.s.balancer_state =
            resolve_balancer_state(self.s.enabled, active, prev_active, prev_a, safe, held);

        if active && !prev_active {
            info!(charger = self.charger_id, amps = safe, reason = reason.as_str(), "charging started");
        } else if prev_active && !active {
            info!(charger = self.charger_id, was_a = prev_a, reason = reason.as_str(), "charging stopped");
        }

        match origin {
            Origin::Compute(available) if prev_active && !active => {
                self.t.notifications.push(Notification::OverloadStop {
                    previous_a: prev_a,
                    available_a: round2(available),
                });
            }
            Origin::Fallback { newly: true } => {
                let n = match p.unavailable_mode {
                    UnavailableMode::SetCurrent { .. } if safe > 0.0 => {
                        Notification::FallbackActivated { amps: safe }
                    }
                    _ => Notification::MeterUnavailable,
                };
                self.t.notifications.push(n);
            }
            _ => {}
        }
        if active && !prev_active {
            self.t
                .notifications
                .push(Notification::ChargingResumed { amps: safe });
        }

        self.t.actions.extend(plan_actions(
            prev_a,
            safe,
            self.charger_id,
            p.supply_voltage_v,
        ));
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Owns the state for one charger and applies events to it.
#[derive(Debug, Clone)]
pub struct Coordinator {
    charger_id: String,
    params: BalancerParameters,
    state: ChargerState,
}

impl Coordinator {
    pub fn new(charger_id: impl Into<String>, params: BalancerParameters, state: ChargerState) -> Self {
        Self {
            charger_id: charger_id.into(),
            params,
            state,
        }
    }

    pub fn handle(&mut self, event: Event, ctx: Context) -> Transition {
        let (next, transition) = recompute(&self.state, &self.params, &self.charger_id, event, ctx);
        self.state = next;
        transition
    }

    pub fn state(&self) -> &ChargerState {
        &self.state
    }

    pub fn params(&self) -> &BalancerParameters {
        &self.params
    }

    /// Replace parameters. The caller validates and triggers the recompute.
    pub fn set_params(&mut self, params: BalancerParameters) {
        self.params = params;
    }

    pub fn charger_id(&self) -> &str {
        &self.charger_id
    }

    pub fn restore(&mut self, current_set_a: f64) {
        self.state.restore(current_set_a);
    }
}
