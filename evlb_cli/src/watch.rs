//! `evlb watch`: live balancing fed from stdin on the real clock.
//!
//! Each stdin line is a meter reading in Watts or one of the commands
//! understood by [`parse_line`]. EOF, `quit` or Ctrl-C shut down cleanly.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use evlb_config::Config;
use evlb_core::{BalancerBuilder, Message, Notification, ParameterName, Reason};
use evlb_hardware::{LoggingActuator, SimulatedActivity, SimulatedMeter};
use evlb_traits::{ChargingActivity, Clock, MeterValue, MonotonicClock, PowerReading};
use eyre::{Result, WrapErr};
use serde_json::json;

/// One parsed stdin line.
#[derive(Debug, PartialEq)]
pub enum Input {
    Meter(MeterValue),
    Activity(ChargingActivity),
    Override(f64),
    Set(ParameterName, f64),
    Enable(bool),
    Ready,
    Quit,
}

pub fn parse_line(line: &str) -> std::result::Result<Option<Input>, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    if head.starts_with('#') {
        return Ok(None);
    }
    let number = |s: Option<&str>| -> std::result::Result<f64, String> {
        let s = s.ok_or_else(|| format!("'{head}' needs a value"))?;
        s.parse::<f64>().map_err(|_| format!("'{s}' is not a number"))
    };

    let input = match head {
        "unavailable" => Input::Meter(MeterValue::Unavailable),
        "unknown" => Input::Meter(MeterValue::Unknown),
        "charging" => Input::Activity(ChargingActivity::Charging),
        "not_charging" => Input::Activity(ChargingActivity::NotCharging),
        "status_unknown" => Input::Activity(ChargingActivity::Unknown),
        "enable" => Input::Enable(true),
        "disable" => Input::Enable(false),
        "ready" => Input::Ready,
        "quit" | "exit" => Input::Quit,
        "override" => Input::Override(number(parts.next())?),
        "set" => {
            let name = parts
                .next()
                .ok_or("'set' needs a parameter name")?
                .parse::<ParameterName>()
                .map_err(|e| e.to_string())?;
            Input::Set(name, number(parts.next())?)
        }
        w => Input::Meter(MeterValue::Watts(
            w.parse::<f64>()
                .map_err(|_| format!("unrecognized input '{w}'"))?,
        )),
    };
    Ok(Some(input))
}

pub fn run(cfg: &Config, json: bool) -> Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let meter = SimulatedMeter::new(clock.clone());
    let activity = SimulatedActivity::new();
    let actuator = LoggingActuator::new().with_commands(
        cfg.actions.start_charging,
        cfg.actions.stop_charging,
        cfg.actions.set_current,
    );
    let (note_tx, note_rx) = unbounded::<Notification>();
    let (tx, rx) = unbounded::<Message>();

    let mut rt = BalancerBuilder::from_config(cfg)
        .with_actuator(actuator)
        .with_clock(clock.clone())
        .with_power_source(meter.clone())
        .with_activity_source(activity.clone())
        .with_notifier(note_tx)
        .build()?;

    {
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(Message::Shutdown);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let printer = thread::spawn(move || {
        for n in note_rx {
            println!("{}", render_notification(&n, json));
        }
    });

    thread::spawn(move || feed_stdin(&tx, &meter, &activity, clock.as_ref()));

    tracing::info!(charger = rt.charger_id(), "watching stdin");
    rt.run(&rx);

    let state = rt.state().clone();
    let failures = rt.diagnostics().failure_count;
    drop(rt);
    let _ = printer.join();

    if json {
        println!(
            "{}",
            json!({
                "final": true,
                "current_a": state.current_set_a,
                "state": state.balancer_state.as_str(),
                "action_failures": failures,
            })
        );
    } else {
        println!(
            "stopped: {} A ({}), {failures} action failures",
            state.current_set_a,
            state.balancer_state.as_str()
        );
    }
    Ok(())
}

/// `fault:` prefix for faults, `notify:` for resolutions.
fn render_notification(n: &Notification, json: bool) -> String {
    if json {
        json!({ "notification": n.kind(), "fault": n.is_fault(), "message": n.to_string() })
            .to_string()
    } else if n.is_fault() {
        format!("fault: {n}")
    } else {
        format!("notify: {n}")
    }
}

fn feed_stdin(
    tx: &Sender<Message>,
    meter: &SimulatedMeter,
    activity: &SimulatedActivity,
    clock: &(dyn Clock + Send + Sync),
) {
    let stdin = std::io::stdin();
    for (idx, line) in stdin.lock().lines().enumerate() {
        let Ok(line) = line else { break };
        let msg = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(Input::Quit)) => break,
            Ok(Some(input)) => to_message(input, meter, activity, clock.now()),
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "ignored stdin line");
                continue;
            }
        };
        if tx.send(msg).is_err() {
            return;
        }
    }
    let _ = tx.send(Message::Shutdown);
}

fn to_message(
    input: Input,
    meter: &SimulatedMeter,
    activity: &SimulatedActivity,
    now: std::time::Instant,
) -> Message {
    match input {
        Input::Meter(value) => {
            meter.set(value);
            Message::Reading(PowerReading {
                timestamp: now,
                value,
            })
        }
        Input::Activity(a) => {
            activity.set(a);
            Message::Recompute(Reason::MeterUpdate)
        }
        Input::Override(amps) => Message::ManualOverride(amps),
        Input::Set(name, value) => Message::SetParameter { name, value },
        Input::Enable(on) => Message::SetEnabled(on),
        Input::Ready => Message::SystemReady,
        Input::Quit => Message::Shutdown,
    }
}
