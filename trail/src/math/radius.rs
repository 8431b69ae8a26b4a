/// Earth radius at the equator, in meters.
pub const RADIUS_EQUATOR: f64 = 6_378_137.0;

/// Earth radius at the poles, in meters.
pub const RADIUS_POLE: f64 = 6_356_752.0;

/// Returns the geocentric radius of the reference ellipsoid at sea
/// level for latitude `lat_deg`.
///
/// # References
///
/// 1. [Earth radius at a given latitude](https://rechneronline.de/earth-radius/)
pub fn earth_radius(lat_deg: f64) -> f64 {
    let (sin, cos) = lat_deg.to_radians().sin_cos();
    let (a, b) = (RADIUS_EQUATOR, RADIUS_POLE);
    let num = (a * a * cos).powi(2) + (b * b * sin).powi(2);
    let den = (a * cos).powi(2) + (b * sin).powi(2);
    (num / den).sqrt()
}

#[cfg(test)]
mod tests {
    use super::{earth_radius, RADIUS_EQUATOR, RADIUS_POLE};
    use approx::assert_relative_eq;

    #[test]
    fn test_radius_at_extremes() {
        assert_relative_eq!(earth_radius(0.0), RADIUS_EQUATOR, epsilon = 1e-6);
        assert_relative_eq!(earth_radius(90.0), RADIUS_POLE, epsilon = 1e-6);
        assert_relative_eq!(earth_radius(-90.0), RADIUS_POLE, epsilon = 1e-6);
    }

    #[test]
    fn test_radius_bounded() {
        for tenth_deg in -900..=900 {
            let r = earth_radius(f64::from(tenth_deg) / 10.0);
            assert!(r >= RADIUS_POLE - 1e-6, "{r}");
            assert!(r <= RADIUS_EQUATOR + 1e-6, "{r}");
        }
        assert!(earth_radius(45.0) < earth_radius(30.0));
    }
}
