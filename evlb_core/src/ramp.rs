//! Ramp-up hysteresis and operational state.
//!
//! Reductions always apply immediately. Increases (and holding steady) are
//! only allowed once `ramp_up_time` has passed since the last reduction or
//! deterioration of headroom.

use std::fmt;
use std::time::{Duration, Instant};

/// Operational state reported alongside the current set-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancerState {
    #[default]
    Stopped,
    Adjusting,
    Active,
    RampUpHold,
    Disabled,
}

impl BalancerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BalancerState::Stopped => "stopped",
            BalancerState::Adjusting => "adjusting",
            BalancerState::Active => "active",
            BalancerState::RampUpHold => "ramp_up_hold",
            BalancerState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for BalancerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit `target_a` by the cooldown window.
///
/// Returns `(applied_a, held)`; `held` is true only when an increase was
/// refused.
pub fn apply_ramp_up_limit(
    current_a: f64,
    target_a: f64,
    last_reduction: Option<Instant>,
    now: Instant,
    ramp_up: Duration,
) -> (f64, bool) {
    if target_a < current_a {
        return (target_a, false);
    }
    let cooled = match last_reduction {
        None => true,
        Some(t) => now.saturating_duration_since(t) >= ramp_up,
    };
    if cooled {
        (target_a, false)
    } else {
        (current_a, target_a > current_a)
    }
}

/// Result of one ramp evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampDecision {
    pub final_a: f64,
    pub held: bool,
}

/// Cooldown bookkeeping carried across recomputes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RampController {
    last_reduction: Option<Instant>,
    previous_available_a: Option<f64>,
}

impl RampController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_reduction(&self) -> Option<Instant> {
        self.last_reduction
    }

    pub fn previous_available(&self) -> Option<f64> {
        self.previous_available_a
    }

    /// Record this cycle's headroom. Restarts the cooldown when headroom
    /// shrank while the previous cycle could still charge (`>= min_ev_a`).
    /// Returns whether the cooldown was restarted.
    pub fn observe_available(&mut self, available_a: f64, min_ev_a: f64, now: Instant) -> bool {
        let restarted = match self.previous_available_a {
            Some(prev) => available_a < prev && prev >= min_ev_a,
            None => false,
        };
        if restarted {
            self.last_reduction = Some(now);
        }
        self.previous_available_a = Some(available_a);
        restarted
    }

    pub fn apply(
        &mut self,
        current_a: f64,
        target_a: f64,
        now: Instant,
        ramp_up: Duration,
    ) -> RampDecision {
        let (final_a, held) =
            apply_ramp_up_limit(current_a, target_a, self.last_reduction, now, ramp_up);
        if final_a < current_a {
            self.last_reduction = Some(now);
        }
        RampDecision { final_a, held }
    }

    /// Forget the previous headroom so the next valid reading is treated as
    /// a first observation.
    pub fn clear_history(&mut self) {
        self.previous_available_a = None;
    }
}

/// Operational state after a commit.
pub fn resolve_balancer_state(
    enabled: bool,
    active: bool,
    prev_active: bool,
    prev_current_a: f64,
    current_a: f64,
    held: bool,
) -> BalancerState {
    if !enabled {
        BalancerState::Disabled
    } else if !active {
        BalancerState::Stopped
    } else if held {
        BalancerState::RampUpHold
    } else if !prev_active || current_a != prev_current_a {
        BalancerState::Adjusting
    } else {
        BalancerState::Active
    }
}
