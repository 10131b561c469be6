//! `evlb check`: print the effective parameters of a validated config.

use std::path::Path;

use evlb_config::Config;
use evlb_core::{BalancerParameters, RetryPolicy, UnavailableMode};
use eyre::Result;
use serde_json::json;

pub fn run(cfg: &Config, path: &Path, json: bool) -> Result<()> {
    let params = BalancerParameters::from(cfg);
    // Same bounds as the config check, but proves the runtime accepts them.
    params.validate()?;
    let retry = RetryPolicy::from(&cfg.actions);
    let fallback_a = match params.unavailable_mode {
        UnavailableMode::SetCurrent { fallback_a } => Some(fallback_a),
        _ => None,
    };

    if json {
        let out = json!({
            "ok": true,
            "charger_id": cfg.charger.id,
            "enabled": cfg.balancer.enabled,
            "await_ready": cfg.balancer.await_ready,
            "parameters": {
                "supply_voltage": params.supply_voltage_v,
                "max_service_current": params.max_service_current_a,
                "max_charger_current": params.max_charger_current_a,
                "min_ev_current": params.min_ev_current_a,
                "ramp_up_time": params.ramp_up_time_s,
                "overload_trigger_delay": params.overload_trigger_delay_s,
                "overload_loop_interval": params.overload_loop_interval_s,
                "unavailable_behavior": params.unavailable_mode.as_str(),
                "fallback_current": fallback_a,
            },
            "actions": {
                "start_charging": cfg.actions.start_charging,
                "stop_charging": cfg.actions.stop_charging,
                "set_current": cfg.actions.set_current,
                "max_retries": retry.max_retries,
                "retry_base_delay_ms": cfg.actions.retry_base_delay_ms,
            },
        });
        println!("{out}");
        return Ok(());
    }

    println!("config OK: {}", path.display());
    println!("  charger                 {}", cfg.charger.id);
    println!("  enabled                 {}", cfg.balancer.enabled);
    println!("  supply_voltage          {} V", params.supply_voltage_v);
    println!("  max_service_current     {} A", params.max_service_current_a);
    println!("  max_charger_current     {} A", params.max_charger_current_a);
    println!("  min_ev_current          {} A", params.min_ev_current_a);
    println!("  ramp_up_time            {} s", params.ramp_up_time_s);
    println!("  overload_trigger_delay  {} s", params.overload_trigger_delay_s);
    println!("  overload_loop_interval  {} s", params.overload_loop_interval_s);
    match fallback_a {
        Some(a) => println!("  unavailable_behavior    set_current ({a} A)"),
        None => println!(
            "  unavailable_behavior    {}",
            params.unavailable_mode.as_str()
        ),
    }
    println!(
        "  retries                 {} (base {} ms)",
        retry.max_retries,
        retry.base_delay.as_millis()
    );
    Ok(())
}
