mod common;

use std::sync::Arc;

use common::Spy;
use evlb_core::{
    Balancer, BalancerError, BalancerParameters, BuildError, InMemoryStore, Message,
    ParameterName, ParameterStore, RetryPolicy, build_runtime,
};
use evlb_traits::{ManualClock, PowerReading};

#[test]
fn try_build_reports_missing_actuator() {
    let err = Balancer::builder()
        .with_parameters(BalancerParameters::default())
        .try_build()
        .err()
        .expect("missing actuator");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingActuator)
    ));
}

#[test]
fn try_build_reports_missing_parameters() {
    let err = Balancer::builder()
        .with_actuator(Spy::new())
        .try_build()
        .err()
        .expect("missing parameters");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingParameters)
    ));
}

#[test]
fn non_positive_voltage_is_rejected() {
    let params = BalancerParameters {
        supply_voltage_v: 0.0,
        ..BalancerParameters::default()
    };
    let err = build_runtime(
        Spy::new(),
        params,
        Arc::new(ManualClock::new()),
        "c1",
        RetryPolicy::none(),
    )
    .err()
    .expect("voltage 0");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn out_of_range_parameters_are_configuration_errors() {
    let params = BalancerParameters {
        min_ev_current_a: 40.0,
        ..BalancerParameters::default()
    };
    let err = Balancer::builder()
        .with_actuator(Spy::new())
        .with_parameters(params)
        .build()
        .err()
        .expect("min ev out of range");
    assert!(matches!(
        err.downcast_ref::<BalancerError>(),
        Some(BalancerError::ConfigurationInvalid(_))
    ));
}

#[test]
fn stored_parameters_win_and_changes_write_through() {
    let saved = BalancerParameters {
        max_charger_current_a: 10.0,
        ..BalancerParameters::default()
    };
    let clock = ManualClock::new();
    let mut rt = Balancer::builder()
        .with_actuator(Spy::new())
        .with_parameters(BalancerParameters::default())
        .with_store(InMemoryStore::with(saved))
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("build");
    assert_eq!(rt.params().max_charger_current_a, 10.0);

    rt.handle(Message::SetParameter {
        name: ParameterName::MaxChargerCurrent,
        value: 20.0,
    })
    .expect("in range");
    assert_eq!(rt.params().max_charger_current_a, 20.0);

    let err = rt
        .set_parameter(ParameterName::MaxChargerCurrent, 81.0)
        .err()
        .expect("above range");
    assert!(format!("{err}").contains("max_charger_current"));
    assert_eq!(rt.params().max_charger_current_a, 20.0);
}

#[test]
fn in_memory_store_round_trips() {
    let mut store = InMemoryStore::new();
    let p = BalancerParameters::default();
    store.store(&p).expect("store");
    assert_eq!(store.load(), Some(p));
}

#[test]
fn await_ready_defers_meter_loss() {
    let clock = ManualClock::new();
    let spy = Spy::new();
    let mut rt = Balancer::builder()
        .with_actuator(spy.clone())
        .with_parameters(BalancerParameters::default())
        .with_clock(Arc::new(clock.clone()))
        .await_ready(true)
        .restore_current(16.0)
        .build()
        .expect("build");

    let out = rt
        .handle(Message::Reading(PowerReading::unavailable(clock_now(&clock))))
        .expect("reading");
    assert!(out.actions.is_empty());
    assert_eq!(rt.state().current_set_a, 16.0);

    // No power source configured: readiness without a reading is a missing meter.
    let out = rt.system_ready();
    assert_eq!(rt.state().current_set_a, 0.0);
    assert_eq!(out.actions.len(), 1);
    assert!(rt.state().ready);
}

fn clock_now(clock: &ManualClock) -> std::time::Instant {
    use evlb_traits::Clock;
    clock.now()
}
