use std::sync::{Arc, Mutex, PoisonError};

use evlb_traits::{Actuator, BoxError, Command};

use crate::error::HwError;

/// One call received by [`LoggingActuator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCall {
    pub command: Command,
    pub charger_id: String,
    /// Set for `SetCurrent` only.
    pub amps: Option<f64>,
    pub watts: Option<f64>,
    /// Whether the call reported success.
    pub ok: bool,
}

#[derive(Default)]
struct Inner {
    calls: Vec<ActuatorCall>,
    fail_next: u32,
}

/// Actuator that logs and records every command instead of driving a charger.
#[derive(Clone)]
pub struct LoggingActuator {
    inner: Arc<Mutex<Inner>>,
    start: bool,
    stop: bool,
    set_current: bool,
}

impl Default for LoggingActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            start: true,
            stop: true,
            set_current: true,
        }
    }

    /// Which commands are wired up; the rest are reported unsupported.
    pub fn with_commands(mut self, start: bool, stop: bool, set_current: bool) -> Self {
        self.start = start;
        self.stop = stop;
        self.set_current = set_current;
        self
    }

    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.lock().calls.clone()
    }

    /// Remove and return the recorded calls.
    pub fn drain(&self) -> Vec<ActuatorCall> {
        std::mem::take(&mut self.lock().calls)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        command: Command,
        charger_id: &str,
        amps: Option<f64>,
        watts: Option<f64>,
    ) -> Result<(), BoxError> {
        let mut inner = self.lock();
        let ok = inner.fail_next == 0;
        if !ok {
            inner.fail_next -= 1;
        }
        inner.calls.push(ActuatorCall {
            command,
            charger_id: charger_id.to_string(),
            amps,
            watts,
            ok,
        });
        drop(inner);

        if ok {
            tracing::info!(%command, charger = charger_id, ?amps, ?watts, "charger command");
            Ok(())
        } else {
            tracing::warn!(%command, charger = charger_id, "simulated charger failure");
            Err(Box::new(HwError::NoResponse {
                charger_id: charger_id.to_string(),
                command: command.as_str(),
            }))
        }
    }
}

impl Actuator for LoggingActuator {
    fn start(&mut self, charger_id: &str) -> Result<(), BoxError> {
        self.record(Command::Start, charger_id, None, None)
    }

    fn stop(&mut self, charger_id: &str) -> Result<(), BoxError> {
        self.record(Command::Stop, charger_id, None, None)
    }

    fn set_current(&mut self, charger_id: &str, amps: f64, watts: f64) -> Result<(), BoxError> {
        self.record(Command::SetCurrent, charger_id, Some(amps), Some(watts))
    }

    fn supports(&self, command: Command) -> bool {
        match command {
            Command::Start => self.start,
            Command::Stop => self.stop,
            Command::SetCurrent => self.set_current,
        }
    }
}
