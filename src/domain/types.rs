/// Percentage in the 0–100 range: fan speed, valve opening or demand score.
pub type Percent = u8;

/// Fully open valve / full demand.
pub const FULL: Percent = 100;

/// Round to the nearest multiple of ten and clamp to 0–100.
///
/// Exact halves go to the even multiple (45 → 40, 35 → 40). Both the fan
/// aggregate and the proportional valve positions go through this helper, so
/// they always snap to the same grid.
pub fn round_to_nearest_ten(value: f64) -> Percent {
    if value.is_nan() {
        return 0;
    }
    let snapped = (value / 10.0).round_ties_even() * 10.0;
    snapped.clamp(0.0, f64::from(FULL)) as Percent
}

/// Convert a raw reading (e.g. a hub attribute) into a whole percentage.
pub fn percent_from_f64(value: f64) -> Option<Percent> {
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, f64::from(FULL)) as Percent)
}

/// Round to one decimal place.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
