//! Pure current arithmetic: headroom, clamping and water-filling.
//!
//! Everything here is stateless and total. Inputs are assumed to have passed
//! the meter health check already (finite, in-range Watts).

/// Resolution of current adjustments (A).
pub const AMP_STEP: f64 = 1.0;

/// Current the EV may still draw without exceeding the service limit.
///
/// The metered `house_w` includes the EV itself, so its estimated draw is
/// removed first to isolate the non-EV load:
///
///   available_a = service_a - max(0, house_w - ev_draw_a * voltage_v) / voltage_v
///
/// Negative results mean the household is already above the service limit.
#[inline]
pub fn compute_available_current(
    service_a: f64,
    ev_draw_a: f64,
    house_w: f64,
    voltage_v: f64,
) -> f64 {
    let non_ev_w = (house_w - ev_draw_a * voltage_v).max(0.0);
    service_a - non_ev_w / voltage_v
}

/// Clamp a raw headroom value to the charger's limits.
///
/// Returns `None` ("stop") when `min(raw_a, max_charger_a)` is below
/// `min_ev_a`; otherwise that value floored to whole Amps. A value that
/// only drops below `min_ev_a` because of flooring is also a stop, so a
/// `Some` is always within `[min_ev_a, max_charger_a]`.
#[inline]
pub fn clamp_current(raw_a: f64, min_ev_a: f64, max_charger_a: f64) -> Option<f64> {
    let capped = raw_a.min(max_charger_a);
    if capped < min_ev_a {
        return None;
    }
    let floored = floor_to_step(capped);
    if floored < min_ev_a {
        None
    } else {
        Some(floored)
    }
}

#[inline]
fn floor_to_step(a: f64) -> f64 {
    (a / AMP_STEP).floor() * AMP_STEP
}

/// Last line of defence before a value reaches the actuator: a positive
/// current never exceeds `min(max_charger_a, max_service_a)`. Zero passes
/// through untouched.
#[inline]
pub fn clamp_to_safe_output(current_a: f64, max_charger_a: f64, max_service_a: f64) -> f64 {
    if current_a > 0.0 {
        let safe_max = max_charger_a.min(max_service_a);
        if current_a > safe_max {
            return safe_max;
        }
    }
    current_a
}

/// Charging power for a current, rounded to 0.1 W.
#[inline]
pub fn watts_for(amps: f64, voltage_v: f64) -> f64 {
    (amps * voltage_v * 10.0).round() / 10.0
}

/// Per-charger limits for [`distribute_current`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargerLimits {
    pub min_a: f64,
    pub max_a: f64,
}

impl ChargerLimits {
    pub fn new(min_a: f64, max_a: f64) -> Self {
        Self { min_a, max_a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Active,
    Capped,
    Excluded,
}

/// Share `pool_a` fairly across chargers (water-filling).
///
/// Each pass divides what is left of the pool equally among the chargers
/// still `Active`. Chargers whose share is below their minimum are
/// `Excluded` (allocated 0); only when a pass excludes nobody are chargers
/// whose share reaches their maximum `Capped` there, returning the surplus
/// to the pool. Passes repeat until nothing changes category.
///
/// Every pass depends only on the set of tags, never on position, so the
/// result does not depend on the order of `chargers`. Each pass retires at
/// least one charger, bounding the loop at `chargers.len()` passes.
///
/// Allocations are floored to whole Amps; a charger whose floored share no
/// longer reaches its minimum is allocated 0.
pub fn distribute_current(pool_a: f64, chargers: &[ChargerLimits]) -> Vec<f64> {
    let mut slots = vec![Slot::Active; chargers.len()];

    let share = loop {
        let capped_sum: f64 = chargers
            .iter()
            .zip(&slots)
            .filter(|(_, s)| **s == Slot::Capped)
            .map(|(c, _)| c.max_a)
            .sum();
        let active = slots.iter().filter(|s| **s == Slot::Active).count();
        if active == 0 {
            break 0.0;
        }
        let share = (pool_a - capped_sum) / active as f64;

        let mut changed = false;
        for (c, slot) in chargers.iter().zip(slots.iter_mut()) {
            if *slot == Slot::Active && share < c.min_a {
                *slot = Slot::Excluded;
                changed = true;
            }
        }
        if changed {
            continue;
        }

        for (c, slot) in chargers.iter().zip(slots.iter_mut()) {
            if *slot == Slot::Active && share >= c.max_a {
                *slot = Slot::Capped;
                changed = true;
            }
        }
        if !changed {
            break share;
        }
    };

    chargers
        .iter()
        .zip(&slots)
        .map(|(c, slot)| {
            let raw = match slot {
                Slot::Active => share,
                Slot::Capped => c.max_a,
                Slot::Excluded => return 0.0,
            };
            let floored = floor_to_step(raw);
            if floored < c.min_a { 0.0 } else { floored }
        })
        .collect()
}
