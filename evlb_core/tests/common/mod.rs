#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use evlb_core::{Balancer, BalancerParameters, Outcome, RetryPolicy};
use evlb_traits::{
    ActivitySource, Actuator, BoxError, ChargingActivity, Clock, Command, ManualClock, MeterValue,
    PowerReading, PowerSource,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(String),
    Stop(String),
    Set(String, f64, f64),
}

/// Actuator that records every attempt and can fail on demand.
#[derive(Clone, Default)]
pub struct Spy {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_next: Arc<Mutex<u32>>,
    unsupported: Vec<Command>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(mut self, command: Command) -> Self {
        self.unsupported.push(command);
        self
    }

    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock().unwrap() = n;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) -> Result<(), BoxError> {
        self.calls.lock().unwrap().push(call);
        let mut fail = self.fail_next.lock().unwrap();
        if *fail > 0 {
            *fail -= 1;
            return Err("charger did not respond".into());
        }
        Ok(())
    }
}

impl Actuator for Spy {
    fn start(&mut self, charger_id: &str) -> Result<(), BoxError> {
        self.record(Call::Start(charger_id.to_string()))
    }

    fn stop(&mut self, charger_id: &str) -> Result<(), BoxError> {
        self.record(Call::Stop(charger_id.to_string()))
    }

    fn set_current(&mut self, charger_id: &str, amps: f64, watts: f64) -> Result<(), BoxError> {
        self.record(Call::Set(charger_id.to_string(), amps, watts))
    }

    fn supports(&self, command: Command) -> bool {
        !self.unsupported.contains(&command)
    }
}

/// Meter whose value tests change directly.
#[derive(Clone)]
pub struct Meter {
    value: Arc<Mutex<MeterValue>>,
    clock: ManualClock,
}

impl Meter {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            value: Arc::new(Mutex::new(MeterValue::Unavailable)),
            clock,
        }
    }

    pub fn set(&self, value: MeterValue) {
        *self.value.lock().unwrap() = value;
    }
}

impl PowerSource for Meter {
    fn read(&mut self) -> Result<PowerReading, BoxError> {
        Ok(PowerReading {
            timestamp: self.clock.now(),
            value: *self.value.lock().unwrap(),
        })
    }
}

#[derive(Clone)]
pub struct Activity(pub Arc<Mutex<ChargingActivity>>);

impl ActivitySource for Activity {
    fn activity(&mut self) -> ChargingActivity {
        *self.0.lock().unwrap()
    }
}

pub struct Harness {
    pub rt: Balancer,
    pub clock: ManualClock,
    pub spy: Spy,
    pub meter: Meter,
}

impl Harness {
    pub fn new(params: BalancerParameters) -> Self {
        Self::with_spy(params, Spy::new())
    }

    pub fn with_spy(params: BalancerParameters, spy: Spy) -> Self {
        let clock = ManualClock::new();
        let meter = Meter::new(clock.clone());
        let rt = Balancer::builder()
            .with_actuator(spy.clone())
            .with_parameters(params)
            .with_clock(Arc::new(clock.clone()))
            .with_power_source(meter.clone())
            .with_charger_id("c1")
            .with_retry(RetryPolicy::none())
            .build()
            .expect("build balancer");
        Self {
            rt,
            clock,
            spy,
            meter,
        }
    }

    /// Deliver a reading and mirror it on the on-demand meter.
    pub fn watts(&mut self, w: f64) -> Outcome {
        self.meter.set(MeterValue::Watts(w));
        let r = PowerReading::watts(self.clock.now(), w);
        self.rt
            .handle(evlb_core::Message::Reading(r))
            .expect("reading")
    }

    pub fn unavailable(&mut self) -> Outcome {
        self.meter.set(MeterValue::Unavailable);
        let r = PowerReading::unavailable(self.clock.now());
        self.rt
            .handle(evlb_core::Message::Reading(r))
            .expect("reading")
    }

    /// Move time forward, firing timers at their due instants.
    pub fn advance(&mut self, secs: u64) -> Outcome {
        let target = self.clock.now() + Duration::from_secs(secs);
        let mut out = Outcome::default();
        while let Some(due) = self.rt.next_deadline() {
            if due > target {
                break;
            }
            self.clock.advance_to(due);
            let step = self.rt.poll_timers();
            out.actions.extend(step.actions);
            out.notifications.extend(step.notifications);
        }
        self.clock.advance_to(target);
        out
    }

    pub fn current(&self) -> f64 {
        self.rt.state().current_set_a
    }
}

pub fn set(amps: f64, voltage: f64) -> Call {
    Call::Set("c1".into(), amps, (amps * voltage * 10.0).round() / 10.0)
}

pub fn start() -> Call {
    Call::Start("c1".into())
}

pub fn stop() -> Call {
    Call::Stop("c1".into())
}
