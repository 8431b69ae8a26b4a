/// Reference flat-ground speed of Tobler's model, in km/h.
const TOBLER_REFERENCE_KMH: f64 = 5.0;

/// Returns the estimated walking time in hours over a segment of
/// `distance_m` meters climbing `slope_m` meters, for a walker whose
/// flat-ground pace is `flat_speed_kmh`.
///
/// Segments shorter than a millimeter take no time.
///
/// # References
///
/// 1. [Tobler's hiking function](https://en.wikipedia.org/wiki/Tobler%27s_hiking_function)
pub fn hiking_time(distance_m: f64, slope_m: f64, flat_speed_kmh: f64) -> f64 {
    if distance_m.abs() < 0.001 {
        return 0.0;
    }
    let ratio = flat_speed_kmh / TOBLER_REFERENCE_KMH;
    let (distance, slope) = (distance_m / 1000.0, slope_m / 1000.0);
    let speed = 6.0 * (-3.5 * (slope / distance + 0.05).abs()).exp();
    distance / speed / ratio
}
