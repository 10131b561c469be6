//! CSV event traces for offline replay.
//!
//! Expected headers:
//! t_s,event,value
//!
//! Example:
//! t_s,event,value
//! 0,ready,
//! 0,power,3000
//! 12.5,power,9500
//! 20,unavailable,
//! 40,max_charger,16

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    /// Meter reports `value` Watts.
    Power,
    Unavailable,
    Unknown,
    /// Charger status signal.
    Charging,
    NotCharging,
    StatusUnknown,
    /// Runtime parameter changes; `value` carries the new setting.
    MaxCharger,
    MinEv,
    RampUp,
    /// One-shot manual limit in Amps.
    Override,
    Enable,
    Disable,
    /// Host finished starting.
    Ready,
}

impl TraceEvent {
    pub fn needs_value(self) -> bool {
        matches!(
            self,
            TraceEvent::Power
                | TraceEvent::MaxCharger
                | TraceEvent::MinEv
                | TraceEvent::RampUp
                | TraceEvent::Override
        )
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    /// Seconds since the start of the trace.
    pub t_s: f64,
    pub event: TraceEvent,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Load a trace from disk. See [`parse_trace`] for the checks applied.
pub fn load_trace(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;
    read_rows(rdr)
}

/// Parse a trace from CSV text.
///
/// Enforces the exact `t_s,event,value` header, a value on every event
/// that needs one, and non-decreasing timestamps.
pub fn parse_trace(text: &str) -> eyre::Result<Vec<TraceRow>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    read_rows(rdr)
}

fn read_rows<R: std::io::Read>(mut rdr: csv::Reader<R>) -> eyre::Result<Vec<TraceRow>> {
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read trace headers: {}", e))?
        .clone();
    let expected = ["t_s", "event", "value"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 't_s,event,value', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let line = idx + 2;
        let row = rec.map_err(|e| eyre::eyre!("invalid trace row {}: {}", line, e))?;
        if !row.t_s.is_finite() || row.t_s < 0.0 {
            eyre::bail!("trace row {line}: t_s must be a non-negative number");
        }
        if let Some(prev) = rows.last() {
            if row.t_s < prev.t_s {
                eyre::bail!("trace row {line}: timestamps must not go backwards");
            }
        }
        if row.event.needs_value() && row.value.is_none() {
            eyre::bail!("trace row {line}: event {:?} requires a value", row.event);
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_events_with_and_without_values() {
        let rows = parse_trace("t_s,event,value\n0,ready,\n0,power,3000\n5,not_charging,\n")
            .expect("parse");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].event, TraceEvent::Ready);
        assert_eq!(rows[1].value, Some(3000.0));
        assert_eq!(rows[2].event, TraceEvent::NotCharging);
        assert_eq!(rows[2].value, None);
    }

    #[test]
    fn rejects_power_without_value() {
        let err = parse_trace("t_s,event,value\n1,power,\n").expect_err("missing value");
        assert!(format!("{err}").contains("requires a value"));
    }

    #[test]
    fn rejects_time_travel() {
        let err = parse_trace("t_s,event,value\n5,power,100\n4,power,200\n")
            .expect_err("backwards timestamps");
        assert!(format!("{err}").contains("backwards"));
    }
}
