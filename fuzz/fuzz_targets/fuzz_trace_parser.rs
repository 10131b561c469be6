#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(rows) = evlb_config::parse_trace(data) {
        for pair in rows.windows(2) {
            assert!(pair[0].t_s <= pair[1].t_s);
        }
        for row in &rows {
            assert!(row.t_s.is_finite() && row.t_s >= 0.0);
            if row.event.needs_value() {
                assert!(row.value.is_some());
            }
        }
    }
});
