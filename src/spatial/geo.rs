// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Great-circle geometry helpers.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude, used to widen a radius into a
/// bounding box before the exact refinement.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Great-circle distance in kilometers between two `(lon, lat)` points.
#[must_use]
pub fn haversine_km(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lon1, lat1) = (a[0].to_radians(), a[1].to_radians());
    let (lon2, lat2) = (b[0].to_radians(), b[1].to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Whether `(x, y)` is a finite lon/lat pair inside
/// `[-180, 180] x [-90, 90]`.
#[must_use]
pub fn valid_coordinates(x: f64, y: f64) -> bool {
    x.is_finite() && y.is_finite() && (-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const PARIS: [f64; 2] = [2.3522, 48.8566];
    const LONDON: [f64; 2] = [-0.1276, 51.5072];
    const MADRID: [f64; 2] = [-3.7038, 40.4168];

    #[test]
    fn haversine_known_distances() {
        assert!(haversine_km(PARIS, PARIS).abs() < 1e-9);

        let paris_london = haversine_km(PARIS, LONDON);
        assert!(
            (343.0..345.0).contains(&paris_london),
            "Paris-London was {paris_london}",
        );

        let paris_madrid = haversine_km(PARIS, MADRID);
        assert!(
            (1050.0..1056.0).contains(&paris_madrid),
            "Paris-Madrid was {paris_madrid}",
        );
    }

    #[test]
    fn haversine_is_symmetric() {
        assert!((haversine_km(PARIS, LONDON) - haversine_km(LONDON, PARIS)).abs() < 1e-9);
    }

    #[test]
    fn coordinate_validation() {
        assert!(valid_coordinates(2.35, 48.86));
        assert!(valid_coordinates(-180.0, 90.0));
        assert!(!valid_coordinates(181.0, 0.0));
        assert!(!valid_coordinates(0.0, -91.0));
        assert!(!valid_coordinates(f64::NAN, 0.0));
        assert!(!valid_coordinates(f64::INFINITY, 0.0));
    }
}
