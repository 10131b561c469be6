use evlb_config::{TraceEvent, load_trace};
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_trace_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    fs::write(
        &path,
        "t_s,event,value\n0,ready,\n0,power,3000\n10,power,9500\n20,unavailable,\n30,override,8\n",
    )
    .unwrap();

    let rows = load_trace(&path).expect("load trace");
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[3].event, TraceEvent::Unavailable);
    assert_eq!(rows[4].value, Some(8.0));
}

#[test]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    fs::write(&path, "time,kind,watts\n0,power,3000\n").unwrap();

    let err = load_trace(&path).expect_err("headers are strict");
    assert!(format!("{err}").contains("t_s,event,value"));
}

#[test]
fn rejects_unknown_event() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    fs::write(&path, "t_s,event,value\n0,explode,1\n").unwrap();

    let err = load_trace(&path).expect_err("unknown event");
    assert!(format!("{err}").contains("invalid trace row 2"));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let err = load_trace(&dir.path().join("nope.csv")).expect_err("missing file");
    assert!(format!("{err}").contains("open trace CSV"));
}
