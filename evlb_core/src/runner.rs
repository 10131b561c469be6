//! Single-owner runtime around the coordinator.
//!
//! `Runtime` serialises every recompute: it owns the coordinator state, the
//! action executor and the overload timer table, and processes one message
//! at a time. Hosts either call the methods directly or hand a channel to
//! [`Runtime::run`].

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use evlb_traits::{ActivitySource, Actuator, Clock, PowerReading, PowerSource};
use tracing::{debug, info, warn};

use crate::coordinator::{ChargerState, Context, Coordinator, Event, Reason};
use crate::error::{BalancerError, Result};
use crate::executor::{ActionDiagnostics, ActionExecutor, ActionRequest};
use crate::notify::Notification;
use crate::overload::TimerTable;
use crate::params::{BalancerParameters, ParameterName, ParameterStore};

/// Messages accepted by [`Runtime::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Reading(PowerReading),
    SetParameter { name: ParameterName, value: f64 },
    SetEnabled(bool),
    ManualOverride(f64),
    SystemReady,
    Recompute(Reason),
    Shutdown,
}

/// What one call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Requests handed to the executor, in order.
    pub actions: Vec<ActionRequest>,
    /// Coordinator notifications followed by action failures.
    pub notifications: Vec<Notification>,
}

impl Outcome {
    fn merge(&mut self, other: Outcome) {
        self.actions.extend(other.actions);
        self.notifications.extend(other.notifications);
    }
}

pub struct Runtime<A: Actuator> {
    coordinator: Coordinator,
    executor: ActionExecutor<A>,
    clock: Arc<dyn Clock + Send + Sync>,
    power: Option<Box<dyn PowerSource + Send>>,
    activity: Option<Box<dyn ActivitySource + Send>>,
    store: Option<Box<dyn ParameterStore + Send>>,
    timers: TimerTable,
    notifier: Option<Sender<Notification>>,
}

impl<A: Actuator> Runtime<A> {
    pub(crate) fn new(
        coordinator: Coordinator,
        executor: ActionExecutor<A>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            coordinator,
            executor,
            clock,
            power: None,
            activity: None,
            store: None,
            timers: TimerTable::new(),
            notifier: None,
        }
    }

    pub(crate) fn set_power_source(&mut self, source: Box<dyn PowerSource + Send>) {
        self.power = Some(source);
    }

    pub(crate) fn set_activity_source(&mut self, source: Box<dyn ActivitySource + Send>) {
        self.activity = Some(source);
    }

    pub(crate) fn set_store(&mut self, store: Box<dyn ParameterStore + Send>) {
        self.store = Some(store);
    }

    pub(crate) fn set_notifier(&mut self, tx: Sender<Notification>) {
        self.notifier = Some(tx);
    }

    pub fn state(&self) -> &ChargerState {
        self.coordinator.state()
    }

    pub fn params(&self) -> &BalancerParameters {
        self.coordinator.params()
    }

    pub fn charger_id(&self) -> &str {
        self.coordinator.charger_id()
    }

    pub fn diagnostics(&self) -> &ActionDiagnostics {
        self.executor.diagnostics()
    }

    pub fn actuator(&self) -> &A {
        self.executor.actuator()
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        self.executor.actuator_mut()
    }

    /// Earliest pending overload timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Seed the set-point from a persisted value before the first event.
    pub fn restore(&mut self, current_set_a: f64) {
        self.coordinator.restore(current_set_a);
    }

    pub fn handle(&mut self, msg: Message) -> Result<Outcome> {
        match msg {
            Message::Reading(reading) => Ok(self.dispatch(Event::Reading(reading))),
            Message::SetParameter { name, value } => self.set_parameter(name, value),
            Message::SetEnabled(enabled) => Ok(self.set_enabled(enabled)),
            Message::ManualOverride(amps) => self.manual_override(amps),
            Message::SystemReady => Ok(self.system_ready()),
            Message::Recompute(reason) => Ok(self.recompute(reason)),
            Message::Shutdown => Ok(self.shutdown()),
        }
    }

    /// Re-run the decision with the last known reading.
    pub fn recompute(&mut self, reason: Reason) -> Outcome {
        self.dispatch(Event::Refresh { reason })
    }

    /// Validate and apply one parameter, persist it, then recompute.
    /// Rejected values leave the running parameters untouched.
    pub fn set_parameter(&mut self, name: ParameterName, value: f64) -> Result<Outcome> {
        let next = self.coordinator.params().with_parameter(name, value)?;
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.store(&next) {
                warn!(parameter = %name, error = %e, "failed to persist parameters");
            }
        }
        self.coordinator.set_params(next);
        info!(parameter = %name, value, "parameter changed");
        Ok(self.dispatch(Event::Refresh {
            reason: Reason::ParameterChange,
        }))
    }

    pub fn manual_override(&mut self, amps: f64) -> Result<Outcome> {
        if !amps.is_finite() {
            return Err(eyre::Report::new(BalancerError::ConfigurationInvalid(
                format!("manual override must be a finite current, got {amps}"),
            )));
        }
        Ok(self.dispatch(Event::ManualOverride(amps)))
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Outcome {
        self.dispatch(Event::EnableChanged(enabled))
    }

    /// Host finished starting: evaluate the meter for the first time.
    pub fn system_ready(&mut self) -> Outcome {
        let reading = self.read_power();
        self.dispatch(Event::SystemReady(reading))
    }

    /// Cancel all timers; none is armed afterwards. The charger keeps its
    /// last set-point.
    pub fn shutdown(&mut self) -> Outcome {
        let out = self.dispatch(Event::Shutdown);
        debug!(pending = self.timers.len(), "balancer shut down");
        out
    }

    /// Fire every overload timer that is due on the clock.
    pub fn poll_timers(&mut self) -> Outcome {
        let mut out = Outcome::default();
        let now = self.clock.now();
        for handle in self.timers.take_due(now) {
            let reading = self.read_power();
            out.merge(self.dispatch(Event::TimerFired { handle, reading }));
        }
        out
    }

    /// Process messages until `Shutdown` arrives or every sender is gone.
    /// Overload timers fire between messages.
    pub fn run(&mut self, rx: &Receiver<Message>) {
        loop {
            let msg = match self.timers.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(self.clock.now());
                    match rx.recv_timeout(wait) {
                        Ok(m) => Some(m),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(m) => Some(m),
                    Err(_) => break,
                },
            };
            match msg {
                Some(Message::Shutdown) => {
                    self.shutdown();
                    return;
                }
                Some(m) => {
                    if let Err(e) = self.handle(m) {
                        warn!(error = %e, "message rejected");
                    }
                }
                None => {}
            }
            self.poll_timers();
        }
        self.shutdown();
    }

    fn read_power(&mut self) -> Option<PowerReading> {
        let source = self.power.as_mut()?;
        match source.read() {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "power source read failed");
                None
            }
        }
    }

    fn dispatch(&mut self, event: Event) -> Outcome {
        let now = self.clock.now();
        let ctx = Context {
            now,
            activity: self.activity.as_mut().map(|a| a.activity()),
        };
        let t = self.coordinator.handle(event, ctx);
        self.timers.apply(&t.timers, now);

        let mut notifications = t.notifications;
        notifications.extend(self.executor.execute(&t.actions));
        self.publish(&notifications);
        Outcome {
            actions: t.actions,
            notifications,
        }
    }

    fn publish(&self, notifications: &[Notification]) {
        let Some(tx) = self.notifier.as_ref() else {
            return;
        };
        for n in notifications {
            if tx.send(n.clone()).is_err() {
                debug!("notification receiver dropped");
                return;
            }
        }
    }
}
