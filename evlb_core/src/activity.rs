use evlb_traits::ChargingActivity;

/// Estimated EV draw included in the meter reading (A).
///
/// Only an explicit `NotCharging` removes the set-point from the estimate;
/// a missing or unknown signal assumes the EV draws what it was given.
/// The signal is taken as-is, without debouncing.
#[inline]
pub fn estimate_ev_draw(activity: Option<ChargingActivity>, current_set_a: f64) -> f64 {
    match activity {
        Some(ChargingActivity::NotCharging) => 0.0,
        Some(ChargingActivity::Charging | ChargingActivity::Unknown) | None => current_set_a,
    }
}
