//! Overload correction timers.
//!
//! Meter events can be sparse, so an overload (negative headroom) is
//! re-evaluated on a timer: a one-shot after `overload_trigger_delay`, then a
//! periodic loop every `overload_loop_interval` until headroom is back.
//!
//! The coordinator never touches a real scheduler. It emits
//! [`TimerCommand`]s; the runtime executes them against a [`TimerTable`].
//! Every armed timer gets a fresh generation, so a fire for a handle that
//! is no longer stored is recognised as stale and dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    OverloadTrigger,
    OverloadLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Once { handle: TimerHandle, delay: Duration },
    Every { handle: TimerHandle, interval: Duration },
    Cancel(TimerHandle),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverloadScheduler {
    trigger: Option<TimerHandle>,
    loop_timer: Option<TimerHandle>,
    next_generation: u64,
}

impl OverloadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_armed(&self) -> bool {
        self.trigger.is_some()
    }

    pub fn loop_armed(&self) -> bool {
        self.loop_timer.is_some()
    }

    fn next_handle(&mut self, kind: TimerKind) -> TimerHandle {
        self.next_generation += 1;
        TimerHandle {
            kind,
            generation: self.next_generation,
        }
    }

    /// React to a meter- or parameter-driven recompute.
    pub fn update(&mut self, available_a: f64, delay: Duration, out: &mut Vec<TimerCommand>) {
        if available_a < 0.0 {
            if self.trigger.is_none() && self.loop_timer.is_none() {
                let handle = self.next_handle(TimerKind::OverloadTrigger);
                self.trigger = Some(handle);
                out.push(TimerCommand::Once { handle, delay });
            }
        } else {
            self.cancel_all(out);
        }
    }

    pub fn cancel_all(&mut self, out: &mut Vec<TimerCommand>) {
        if let Some(h) = self.trigger.take() {
            out.push(TimerCommand::Cancel(h));
        }
        if let Some(h) = self.loop_timer.take() {
            out.push(TimerCommand::Cancel(h));
        }
    }

    /// Match a fired handle against the armed timers. A one-shot trigger is
    /// consumed by its fire. Returns `None` for stale handles.
    pub fn accept_fire(&mut self, handle: TimerHandle) -> Option<TimerKind> {
        if self.trigger == Some(handle) {
            self.trigger = None;
            Some(TimerKind::OverloadTrigger)
        } else if self.loop_timer == Some(handle) {
            Some(TimerKind::OverloadLoop)
        } else {
            None
        }
    }

    /// After the one-shot re-evaluation: start the loop if still overloaded.
    pub fn after_trigger_fire(
        &mut self,
        available_a: f64,
        interval: Duration,
        out: &mut Vec<TimerCommand>,
    ) {
        if available_a < 0.0 && self.loop_timer.is_none() {
            let handle = self.next_handle(TimerKind::OverloadLoop);
            self.loop_timer = Some(handle);
            out.push(TimerCommand::Every { handle, interval });
        }
    }

    /// After a periodic re-evaluation: stop looping once headroom is back.
    pub fn after_loop_fire(&mut self, available_a: f64, out: &mut Vec<TimerCommand>) {
        if available_a >= 0.0 {
            if let Some(h) = self.loop_timer.take() {
                out.push(TimerCommand::Cancel(h));
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    due: Instant,
    every: Option<Duration>,
}

/// Pending timers keyed by handle, driven by an external clock.
#[derive(Debug, Default)]
pub struct TimerTable {
    entries: HashMap<TimerHandle, Entry>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, commands: &[TimerCommand], now: Instant) {
        for cmd in commands {
            match *cmd {
                TimerCommand::Once { handle, delay } => {
                    self.entries.insert(
                        handle,
                        Entry {
                            due: now + delay,
                            every: None,
                        },
                    );
                }
                TimerCommand::Every { handle, interval } => {
                    self.entries.insert(
                        handle,
                        Entry {
                            due: now + interval,
                            every: Some(interval),
                        },
                    );
                }
                TimerCommand::Cancel(handle) => {
                    self.entries.remove(&handle);
                }
            }
        }
    }

    /// Remove and return every timer due at `now`, earliest first. Periodic
    /// timers are rescheduled one interval after their due time.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerHandle> {
        let mut due: Vec<(Instant, TimerHandle)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.due <= now)
            .map(|(h, e)| (e.due, *h))
            .collect();
        due.sort_by_key(|(at, h)| (*at, h.generation));

        for (_, handle) in &due {
            let periodic = self.entries.get(handle).and_then(|e| e.every);
            match periodic {
                Some(every) => {
                    if let Some(e) = self.entries.get_mut(handle) {
                        e.due += every;
                    }
                }
                None => {
                    self.entries.remove(handle);
                }
            }
        }
        due.into_iter().map(|(_, h)| h).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.due).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
