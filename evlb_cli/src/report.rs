//! One output line per balancer decision, as text or JSON.

use evlb_core::{ActionKind, ChargerState, MeterStatus, Outcome};
use serde_json::{Value, json};

/// What triggered a decision.
pub struct Trigger<'a> {
    pub t_s: f64,
    pub event: &'a str,
    pub value: Option<f64>,
}

fn meter_name(m: MeterStatus) -> &'static str {
    match m {
        MeterStatus::Pending => "pending",
        MeterStatus::Healthy => "healthy",
        MeterStatus::Unavailable => "unavailable",
    }
}

pub fn to_json(
    trigger: &Trigger<'_>,
    outcome: &Outcome,
    state: &ChargerState,
    error: Option<&str>,
) -> Value {
    let actions: Vec<Value> = outcome
        .actions
        .iter()
        .map(|a| match a.kind {
            ActionKind::SetCurrent { amps, watts } => json!({
                "command": a.kind.command().as_str(),
                "charger_id": a.charger_id,
                "amps": amps,
                "watts": watts,
            }),
            _ => json!({
                "command": a.kind.command().as_str(),
                "charger_id": a.charger_id,
            }),
        })
        .collect();
    let notifications: Vec<Value> = outcome
        .notifications
        .iter()
        .map(|n| json!({ "kind": n.kind(), "message": n.to_string() }))
        .collect();

    json!({
        "t_s": trigger.t_s,
        "event": trigger.event,
        "value": trigger.value,
        "actions": actions,
        "notifications": notifications,
        "current_a": state.current_set_a,
        "active": state.is_active,
        "available_a": state.available_a,
        "state": state.balancer_state.as_str(),
        "meter": meter_name(state.meter),
        "fallback": state.fallback_active,
        "error": error,
    })
}

pub fn to_text(
    trigger: &Trigger<'_>,
    outcome: &Outcome,
    state: &ChargerState,
    error: Option<&str>,
) -> String {
    let mut line = format!("[{:>8.1}s] {}", trigger.t_s, trigger.event);
    if let Some(v) = trigger.value {
        line.push_str(&format!(" {v}"));
    }
    if let Some(e) = error {
        line.push_str(&format!(" rejected: {e}"));
        return line;
    }

    let actions: Vec<String> = outcome
        .actions
        .iter()
        .map(|a| match a.kind {
            ActionKind::Start => "start".to_string(),
            ActionKind::Stop => "stop".to_string(),
            ActionKind::SetCurrent { amps, watts } => format!("set {amps} A ({watts} W)"),
        })
        .collect();
    if actions.is_empty() {
        line.push_str(" -> hold");
    } else {
        line.push_str(&format!(" -> {}", actions.join(", ")));
    }

    line.push_str(&format!(
        " | {} A {}",
        state.current_set_a,
        state.balancer_state.as_str()
    ));
    if let Some(avail) = state.available_a {
        line.push_str(&format!(" avail={avail} A"));
    }
    if state.meter != MeterStatus::Healthy {
        line.push_str(&format!(" meter={}", meter_name(state.meter)));
    }
    for n in &outcome.notifications {
        line.push_str(&format!(" [{}]", n.kind()));
    }
    line
}

pub fn print(
    trigger: &Trigger<'_>,
    outcome: &Outcome,
    state: &ChargerState,
    error: Option<&str>,
    json: bool,
) {
    if json {
        println!("{}", to_json(trigger, outcome, state, error));
    } else {
        println!("{}", to_text(trigger, outcome, state, error));
    }
}
