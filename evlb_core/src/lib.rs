#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core load-balancing logic (hardware-agnostic).
//!
//! All I/O goes through the `evlb_traits` collaborators: the power meter,
//! the optional charging-activity signal, the charger actuator and the clock.
//!
//! ## Architecture
//!
//! - **Arithmetic**: headroom, clamping, water-filling (`arithmetic`)
//! - **Ramp**: instant reductions, delayed increases (`ramp`)
//! - **Meter health**: validation and the unavailable-meter policy (`meter`)
//! - **Overload**: one-shot and periodic re-evaluation timers (`overload`)
//! - **Coordinator**: the decision as a pure state transition (`coordinator`)
//! - **Executor**: actuator calls with retry and backoff (`executor`)
//! - **Runtime**: single owner of state, timers and actuator (`runner`)
//!
//! ## Units
//!
//! Currents are Amps and powers Watts, both `f64`. Set-points are whole
//! Amps; reported powers are rounded to 0.1 W.

pub mod activity;
pub mod arithmetic;
pub mod builder;
pub mod conversions;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod meter;
pub mod notify;
pub mod overload;
pub mod params;
pub mod ramp;
pub mod runner;

pub use arithmetic::{
    ChargerLimits, clamp_current, clamp_to_safe_output, compute_available_current,
    distribute_current, watts_for,
};
pub use builder::{Balancer, BalancerBuilder, build_runtime};
pub use coordinator::{ChargerState, Context, Coordinator, Event, Reason, Transition, recompute};
pub use error::{BalancerError, BuildError, Report, Result};
pub use executor::{ActionDiagnostics, ActionKind, ActionRequest, RetryPolicy, plan_actions};
pub use meter::{MeterHealth, MeterStatus};
pub use notify::Notification;
pub use overload::{TimerCommand, TimerHandle, TimerKind};
pub use params::{BalancerParameters, InMemoryStore, ParameterName, ParameterStore, UnavailableMode};
pub use ramp::BalancerState;
pub use runner::{Message, Outcome, Runtime};
