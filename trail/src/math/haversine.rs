use super::earth_radius;
use crate::TrackPoint;

/// Returns the great circle distance in meters between `p1` and `p2`.
///
/// The distance is measured at the mean elevation of both points when
/// both are known, and at sea level otherwise. When `radius` is
/// `None`, the earth radius at the mean latitude is used.
///
/// # References
///
/// 1. [Movable Type](https://www.movable-type.co.uk/scripts/latlong.html)
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint, radius: Option<f64>) -> f64 {
    let (lat1, lon1) = (p1.lat().to_radians(), p1.lon().to_radians());
    let (lat2, lon2) = (p2.lat().to_radians(), p2.lon().to_radians());
    let (dlat, dlon) = (lat2 - lat1, lon2 - lon1);

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    let altitude = match (p1.elevation, p2.elevation) {
        (Some(e1), Some(e2)) => (e1 + e2) / 2.0,
        _ => 0.0,
    };
    let radius = radius.unwrap_or_else(|| earth_radius((p1.lat() + p2.lat()) / 2.0));
    (radius + altitude) * c
}
