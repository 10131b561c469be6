mod common;

use common::{Harness, set, start, stop};
use evlb_core::{
    BalancerParameters, BalancerState, MeterStatus, Notification, ParameterName, Reason,
    UnavailableMode,
};

fn params(max_charger: f64) -> BalancerParameters {
    BalancerParameters {
        max_charger_current_a: max_charger,
        ..BalancerParameters::default()
    }
}

#[test]
fn a_headroom_capped_by_charger_max() {
    let mut h = Harness::new(params(16.0));
    let out = h.watts(3000.0);

    assert_eq!(h.current(), 16.0);
    assert_eq!(h.spy.calls(), vec![start(), set(16.0, 230.0)]);
    assert_eq!(h.rt.state().available_a, Some(18.96));
    assert_eq!(h.rt.state().last_action_reason, Some(Reason::MeterUpdate));
    assert_eq!(h.rt.state().balancer_state, BalancerState::Adjusting);
    assert_eq!(
        out.notifications,
        vec![Notification::ChargingResumed { amps: 16.0 }]
    );
}

#[test]
fn b_load_jump_stops_instantly() {
    let mut h = Harness::new(params(16.0));
    h.watts(3000.0);
    h.spy.clear();

    // 11 kW with the EV drawing 16 A leaves 7320 W of other load: 0.17 A headroom.
    let out = h.watts(11_000.0);
    assert_eq!(h.current(), 0.0);
    assert_eq!(h.spy.calls(), vec![stop()]);
    assert_eq!(h.rt.state().balancer_state, BalancerState::Stopped);
    assert!(h.rt.state().last_reduction_time().is_some());
    assert_eq!(
        out.notifications,
        vec![Notification::OverloadStop {
            previous_a: 16.0,
            available_a: 0.17
        }]
    );
}

#[test]
fn b_overload_from_stopped_arms_correction() {
    let mut h = Harness::new(params(16.0));
    let out = h.watts(9_500.0);
    assert_eq!(h.current(), 0.0);
    assert!(out.actions.is_empty());
    assert_eq!(h.rt.state().available_a, Some(-9.3));
    assert!(h.rt.state().overload_trigger_armed());
}

#[test]
fn c_fallback_then_recovery() {
    let mut p = params(32.0);
    p.unavailable_mode = UnavailableMode::SetCurrent { fallback_a: 6.0 };
    let mut h = Harness::new(p);

    let out = h.unavailable();
    assert_eq!(h.current(), 6.0);
    assert!(h.rt.state().fallback_active);
    assert_eq!(h.rt.state().meter, MeterStatus::Unavailable);
    assert_eq!(
        h.rt.state().last_action_reason,
        Some(Reason::FallbackUnavailable)
    );
    assert!(
        out.notifications
            .contains(&Notification::FallbackActivated { amps: 6.0 })
    );

    h.rt
        .set_parameter(ParameterName::MaxChargerCurrent, 16.0)
        .expect("in range");
    assert_eq!(h.current(), 6.0, "fallback already below the new max");

    h.spy.clear();
    let out = h.watts(3000.0);
    assert_eq!(h.current(), 16.0);
    assert_eq!(h.spy.calls(), vec![set(16.0, 230.0)]);
    assert!(!h.rt.state().fallback_active);
    assert_eq!(out.notifications, vec![Notification::MeterRecovered]);
}

#[test]
fn d_hard_off_bypasses_arithmetic() {
    let mut h = Harness::new(params(10.0));
    h.watts(1000.0);
    assert_eq!(h.current(), 10.0);
    h.spy.clear();

    h.rt
        .set_parameter(ParameterName::MaxChargerCurrent, 0.0)
        .expect("0 is the off switch");
    assert_eq!(h.current(), 0.0);
    assert_eq!(h.rt.state().current_set_w(230.0), 0.0);
    assert_eq!(h.spy.calls(), vec![stop()]);

    h.spy.clear();
    h.watts(0.0);
    h.watts(500.0);
    assert_eq!(h.current(), 0.0);
    assert!(h.spy.calls().is_empty());

    h.rt
        .set_parameter(ParameterName::MaxChargerCurrent, 16.0)
        .expect("raise again");
    assert_eq!(h.current(), 16.0);
    assert_eq!(h.spy.calls(), vec![start(), set(16.0, 230.0)]);
}

#[test]
fn stop_mode_notifies_once() {
    let mut h = Harness::new(params(16.0));
    h.watts(3000.0);
    let first = h.unavailable();
    assert_eq!(h.current(), 0.0);
    assert!(first.notifications.contains(&Notification::MeterUnavailable));

    let again = h.unavailable();
    assert!(again.notifications.is_empty());
    assert!(again.actions.is_empty());
}

#[test]
fn ignore_mode_keeps_current_and_reclamps_on_parameter_change() {
    let mut p = params(16.0);
    p.unavailable_mode = UnavailableMode::Ignore;
    let mut h = Harness::new(p);
    h.watts(3000.0);
    h.spy.clear();

    let out = h.unavailable();
    assert_eq!(h.current(), 16.0);
    assert!(out.actions.is_empty());

    h.rt
        .set_parameter(ParameterName::MaxChargerCurrent, 10.0)
        .expect("in range");
    assert_eq!(h.current(), 10.0);
    assert_eq!(h.spy.calls(), vec![set(10.0, 230.0)]);
    assert_eq!(
        h.rt.state().last_action_reason,
        Some(Reason::ParameterChange)
    );
}

#[test]
fn ramp_up_waits_for_cooldown() {
    let mut h = Harness::new(params(32.0));
    h.watts(3000.0); // 18 A
    assert_eq!(h.current(), 18.0);

    // Extra 1150 W of house load: headroom 13 A, applied at once.
    h.watts(3000.0 + 18.0 * 230.0 + 1150.0);
    assert_eq!(h.current(), 13.0);

    // Load gone again: hold until 30 s after the reduction.
    h.advance(10);
    h.watts(3000.0 + 13.0 * 230.0);
    assert_eq!(h.current(), 13.0);
    assert_eq!(h.rt.state().balancer_state, BalancerState::RampUpHold);

    h.advance(20);
    h.watts(3000.0 + 13.0 * 230.0);
    assert_eq!(h.current(), 18.0);
}

#[test]
fn unchanged_reading_is_not_recounted() {
    let mut h = Harness::new(params(32.0));
    h.watts(3000.0);
    assert_eq!(h.current(), 18.0);
    h.spy.clear();

    // The 3000 W sample was taken with the charger off; 18 A must not be
    // credited back as EV draw.
    let out = h.rt.recompute(Reason::ParameterChange);
    assert!(out.actions.is_empty());
    assert_eq!(h.current(), 18.0);
    assert_eq!(h.rt.state().available_a, Some(18.96));

    let out = h
        .rt
        .set_parameter(ParameterName::RampUpTime, 30.0)
        .expect("in range");
    assert!(out.actions.is_empty());
    assert_eq!(h.current(), 18.0);

    let out = h.watts(3000.0);
    assert!(out.actions.is_empty());
    assert_eq!(h.current(), 18.0);

    // Fresh sample with the EV drawing 18 A: same headroom.
    let out = h.watts(3000.0 + 18.0 * 230.0);
    assert!(out.actions.is_empty());
    assert_eq!(h.current(), 18.0);
    assert!(h.spy.calls().is_empty());
}

#[test]
fn headroom_loss_while_stopped_restarts_cooldown() {
    // Below min_ev: stopped whatever the headroom.
    let mut h = Harness::new(params(4.0));
    h.watts(3000.0);
    assert_eq!(h.current(), 0.0);
    assert!(h.rt.state().last_reduction_time().is_none());

    h.watts(5000.0);
    assert_eq!(h.rt.state().available_a, Some(10.26));
    assert!(h.rt.state().last_reduction_time().is_some());

    h.advance(10);
    let out = h
        .rt
        .set_parameter(ParameterName::MaxChargerCurrent, 16.0)
        .expect("in range");
    assert!(out.actions.is_empty(), "start held by the cooldown");
    assert_eq!(h.current(), 0.0);
    assert_eq!(h.rt.state().balancer_state, BalancerState::Stopped);

    h.advance(20);
    h.rt.recompute(Reason::ParameterChange);
    assert_eq!(h.current(), 10.0);
    assert_eq!(h.spy.calls(), vec![start(), set(10.0, 230.0)]);
}

#[test]
fn headroom_loss_below_min_ev_keeps_cooldown() {
    let mut h = Harness::new(params(32.0));
    h.watts(7000.0);
    assert_eq!(h.rt.state().available_a, Some(1.57));
    h.watts(7200.0);
    assert_eq!(h.rt.state().available_a, Some(0.7));
    assert!(h.rt.state().last_reduction_time().is_none());

    h.watts(3000.0);
    assert_eq!(h.current(), 18.0);
    assert_eq!(h.spy.calls(), vec![start(), set(18.0, 230.0)]);
}

#[test]
fn manual_override_is_clamped_and_one_shot() {
    let mut h = Harness::new(params(16.0));
    h.watts(3000.0);
    h.spy.clear();

    h.rt.manual_override(40.0).expect("finite");
    assert_eq!(h.current(), 16.0);
    assert!(h.spy.calls().is_empty());

    h.rt.manual_override(8.0).expect("finite");
    assert_eq!(h.current(), 8.0);
    assert_eq!(
        h.rt.state().last_action_reason,
        Some(Reason::ManualOverride)
    );
    assert!(h.rt.state().last_reduction_time().is_none());

    h.rt.manual_override(3.0).expect("finite");
    assert_eq!(h.current(), 0.0);

    assert!(h.rt.manual_override(f64::NAN).is_err());

    // Next meter event resumes balancing.
    h.watts(3000.0);
    assert_eq!(h.current(), 16.0);
}

#[test]
fn disable_freezes_and_enable_recomputes() {
    let mut h = Harness::new(params(16.0));
    h.watts(3000.0);
    h.rt.set_enabled(false);
    assert_eq!(h.rt.state().balancer_state, BalancerState::Disabled);

    h.spy.clear();
    h.watts(20_000.0);
    assert_eq!(h.current(), 16.0);
    assert!(h.spy.calls().is_empty());

    // Enabling recomputes with the last reading (20 kW): stop.
    h.rt.set_enabled(true);
    assert_eq!(h.current(), 0.0);
    assert_eq!(h.spy.calls(), vec![stop()]);
}

#[test]
fn not_charging_signal_drops_ev_estimate() {
    use evlb_core::{Context, Event, recompute};
    use evlb_traits::{ChargingActivity, PowerReading};
    use std::time::Instant;

    let p = params(32.0);
    let mut s = evlb_core::ChargerState::default();
    s.restore(16.0);
    let now = Instant::now();
    let ev = Event::Reading(PowerReading::watts(now, 6000.0));

    let (charging, _) = recompute(&s, &p, "c1", ev, Context::at(now));
    let (idle, _) = recompute(
        &s,
        &p,
        "c1",
        ev,
        Context {
            now,
            activity: Some(ChargingActivity::NotCharging),
        },
    );
    // Charging: 6000 W includes 3680 W of EV, headroom 21.91 A.
    // Idle: the whole 6000 W is house load, headroom 5.91 A is below 6 A.
    assert_eq!(charging.available_a, Some(21.91));
    assert_eq!(charging.current_set_a, 21.0);
    assert_eq!(idle.available_a, Some(5.91));
    assert_eq!(idle.current_set_a, 0.0);
}
