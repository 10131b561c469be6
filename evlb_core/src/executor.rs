//! Turning set-point changes into actuator calls.
//!
//! `plan_actions` is pure and decides which commands a change needs.
//! `ActionExecutor` runs them in order against the actuator, retrying each
//! failing call with exponential backoff. A failure is reported and the
//! remaining commands still run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use evlb_traits::{Actuator, BoxError, Clock, Command};
use tracing::{debug, warn};

use crate::arithmetic::watts_for;
use crate::error::BalancerError;
use crate::notify::Notification;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    Start,
    Stop,
    SetCurrent { amps: f64, watts: f64 },
}

impl ActionKind {
    pub fn command(&self) -> Command {
        match self {
            ActionKind::Start => Command::Start,
            ActionKind::Stop => Command::Stop,
            ActionKind::SetCurrent { .. } => Command::SetCurrent,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub charger_id: String,
}

/// Commands needed to move a charger from `prev_a` to `new_a`.
///
/// | prev | new | actions |
/// |------|-----|---------|
/// | 0    | >0  | Start, SetCurrent |
/// | >0   | 0   | Stop |
/// | X    | Y   | SetCurrent |
pub fn plan_actions(prev_a: f64, new_a: f64, charger_id: &str, voltage_v: f64) -> Vec<ActionRequest> {
    if prev_a == new_a {
        return Vec::new();
    }
    let req = |kind| ActionRequest {
        kind,
        charger_id: charger_id.to_string(),
    };
    let set = ActionKind::SetCurrent {
        amps: new_a,
        watts: watts_for(new_a, voltage_v),
    };
    if new_a <= 0.0 {
        vec![req(ActionKind::Stop)]
    } else if prev_a <= 0.0 {
        vec![req(ActionKind::Start), req(set)]
    } else {
        vec![req(set)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry `n` (0-based): `base_delay * 2^n`.
    pub fn delay_for(&self, n: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << n.min(16))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionDiagnostics {
    pub last_error: Option<String>,
    /// When the last actuator call completed successfully.
    pub last_action_at: Option<Instant>,
    /// Retries performed since start.
    pub retry_count: u32,
    /// Commands that failed after exhausting retries.
    pub failure_count: u32,
}

pub struct ActionExecutor<A: Actuator> {
    actuator: A,
    clock: Arc<dyn Clock + Send + Sync>,
    retry: RetryPolicy,
    diagnostics: ActionDiagnostics,
}

impl<A: Actuator> ActionExecutor<A> {
    pub fn new(actuator: A, clock: Arc<dyn Clock + Send + Sync>, retry: RetryPolicy) -> Self {
        Self {
            actuator,
            clock,
            retry,
            diagnostics: ActionDiagnostics::default(),
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn diagnostics(&self) -> &ActionDiagnostics {
        &self.diagnostics
    }

    /// Run `requests` in order. Returns an `ActionFailed` notification for
    /// every command that still failed after its retries.
    pub fn execute(&mut self, requests: &[ActionRequest]) -> Vec<Notification> {
        let mut failed = Vec::new();
        for req in requests {
            let command = req.kind.command();
            if !self.actuator.supports(command) {
                debug!(%command, charger = %req.charger_id, "action not configured, skipped");
                continue;
            }
            if let Err(e) = self.run_with_retry(req) {
                let err = BalancerError::ActionFailure {
                    command,
                    charger_id: req.charger_id.clone(),
                    message: e.to_string(),
                };
                warn!(error = %err, retries = self.retry.max_retries, "action failed");
                self.diagnostics.last_error = Some(err.to_string());
                self.diagnostics.failure_count += 1;
                failed.push(Notification::ActionFailed {
                    kind: command,
                    charger_id: req.charger_id.clone(),
                    error: e.to_string(),
                });
            }
        }
        failed
    }

    fn run_with_retry(&mut self, req: &ActionRequest) -> Result<(), BoxError> {
        let mut attempt = 0;
        loop {
            match self.call(req) {
                Ok(()) => {
                    self.diagnostics.last_action_at = Some(self.clock.now());
                    return Ok(());
                }
                Err(e) if attempt >= self.retry.max_retries => return Err(e),
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        command = %req.kind.command(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "action failed, retrying"
                    );
                    self.clock.sleep(delay);
                    attempt += 1;
                    self.diagnostics.retry_count += 1;
                }
            }
        }
    }

    fn call(&mut self, req: &ActionRequest) -> Result<(), BoxError> {
        match req.kind {
            ActionKind::Start => self.actuator.start(&req.charger_id),
            ActionKind::Stop => self.actuator.stop(&req.charger_id),
            ActionKind::SetCurrent { amps, watts } => {
                self.actuator.set_current(&req.charger_id, amps, watts)
            }
        }
    }
}
