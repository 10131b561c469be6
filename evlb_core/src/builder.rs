//! Type-state builder for `Balancer` and the generic `build_runtime`.
//!
//! `build()` is only available once an actuator and parameters are set.
//! `try_build()` is always available and reports what is missing at runtime.

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam_channel::Sender;
use evlb_traits::{ActivitySource, Actuator, Clock, MonotonicClock, PowerSource};

use crate::coordinator::{ChargerState, Coordinator};
use crate::error::{BuildError, Result};
use crate::executor::{ActionExecutor, RetryPolicy};
use crate::notify::Notification;
use crate::params::{BalancerParameters, ParameterStore};
use crate::runner::Runtime;

/// Boxed runtime returned by the builder.
pub type Balancer = Runtime<Box<dyn Actuator + Send>>;

pub const DEFAULT_CHARGER_ID: &str = "charger_1";

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct BalancerBuilder<A, P> {
    actuator: Option<Box<dyn Actuator + Send>>,
    params: Option<BalancerParameters>,
    charger_id: String,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    power: Option<Box<dyn PowerSource + Send>>,
    activity: Option<Box<dyn ActivitySource + Send>>,
    store: Option<Box<dyn ParameterStore + Send>>,
    notifier: Option<Sender<Notification>>,
    retry: RetryPolicy,
    await_ready: bool,
    enabled: bool,
    restore_a: Option<f64>,
    _a: PhantomData<A>,
    _p: PhantomData<P>,
}

impl Default for BalancerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            actuator: None,
            params: None,
            charger_id: DEFAULT_CHARGER_ID.to_string(),
            clock: None,
            power: None,
            activity: None,
            store: None,
            notifier: None,
            retry: RetryPolicy::default(),
            await_ready: false,
            enabled: true,
            restore_a: None,
            _a: PhantomData,
            _p: PhantomData,
        }
    }
}

impl Balancer {
    pub fn builder() -> BalancerBuilder<Missing, Missing> {
        BalancerBuilder::default()
    }
}

impl<A, P> BalancerBuilder<A, P> {
    fn retag<A2, P2>(self) -> BalancerBuilder<A2, P2> {
        BalancerBuilder {
            actuator: self.actuator,
            params: self.params,
            charger_id: self.charger_id,
            clock: self.clock,
            power: self.power,
            activity: self.activity,
            store: self.store,
            notifier: self.notifier,
            retry: self.retry,
            await_ready: self.await_ready,
            enabled: self.enabled,
            restore_a: self.restore_a,
            _a: PhantomData,
            _p: PhantomData,
        }
    }

    pub fn with_actuator(mut self, actuator: impl Actuator + Send + 'static) -> BalancerBuilder<Set, P> {
        self.actuator = Some(Box::new(actuator));
        self.retag()
    }

    pub fn with_parameters(mut self, params: BalancerParameters) -> BalancerBuilder<A, Set> {
        self.params = Some(params);
        self.retag()
    }

    pub fn with_charger_id(mut self, id: impl Into<String>) -> Self {
        self.charger_id = id.into();
        self
    }

    /// Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Read on demand when overload timers fire and at `system_ready`.
    pub fn with_power_source(mut self, source: impl PowerSource + Send + 'static) -> Self {
        self.power = Some(Box::new(source));
        self
    }

    pub fn with_activity_source(mut self, source: impl ActivitySource + Send + 'static) -> Self {
        self.activity = Some(Box::new(source));
        self
    }

    /// Persisted parameters, when present, take precedence over
    /// `with_parameters`.
    pub fn with_store(mut self, store: impl ParameterStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notifier(mut self, tx: Sender<Notification>) -> Self {
        self.notifier = Some(tx);
        self
    }

    /// Hold off acting on a missing meter until `system_ready()`.
    pub fn await_ready(mut self, wait: bool) -> Self {
        self.await_ready = wait;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Start from a persisted set-point instead of 0 A.
    pub fn restore_current(mut self, current_set_a: f64) -> Self {
        self.restore_a = Some(current_set_a);
        self
    }

    /// Build with runtime checks for missing pieces.
    pub fn try_build(self) -> Result<Balancer> {
        let Some(actuator) = self.actuator else {
            return Err(eyre::Report::new(BuildError::MissingActuator));
        };
        let stored = self.store.as_ref().and_then(|s| s.load());
        let Some(params) = stored.or(self.params) else {
            return Err(eyre::Report::new(BuildError::MissingParameters));
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let mut state = ChargerState::new(!self.await_ready);
        state.enabled = self.enabled;
        if let Some(a) = self.restore_a {
            state.restore(a);
        }

        let mut rt = build_runtime_with_state(
            actuator,
            params,
            clock,
            self.charger_id,
            self.retry,
            state,
        )?;
        if let Some(p) = self.power {
            rt.set_power_source(p);
        }
        if let Some(a) = self.activity {
            rt.set_activity_source(a);
        }
        if let Some(s) = self.store {
            rt.set_store(s);
        }
        if let Some(tx) = self.notifier {
            rt.set_notifier(tx);
        }
        Ok(rt)
    }
}

impl BalancerBuilder<Set, Set> {
    pub fn build(self) -> Result<Balancer> {
        self.try_build()
    }
}

/// Construct a runtime around any actuator type, without boxing.
pub fn build_runtime<A: Actuator>(
    actuator: A,
    params: BalancerParameters,
    clock: Arc<dyn Clock + Send + Sync>,
    charger_id: impl Into<String>,
    retry: RetryPolicy,
) -> Result<Runtime<A>> {
    build_runtime_with_state(
        actuator,
        params,
        clock,
        charger_id.into(),
        retry,
        ChargerState::default(),
    )
}

fn build_runtime_with_state<A: Actuator>(
    actuator: A,
    params: BalancerParameters,
    clock: Arc<dyn Clock + Send + Sync>,
    charger_id: String,
    retry: RetryPolicy,
    state: ChargerState,
) -> Result<Runtime<A>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if !(params.supply_voltage_v > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "supply voltage must be > 0",
        )));
    }
    if charger_id.trim().is_empty() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "charger id must not be empty",
        )));
    }
    params.validate()?;

    let coordinator = Coordinator::new(charger_id, params, state);
    let executor = ActionExecutor::new(actuator, Arc::clone(&clock), retry);
    Ok(Runtime::new(coordinator, executor, clock))
}
