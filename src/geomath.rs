//! Spherical distance helpers shared by sampling and route annotation.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in meters (haversine).
pub fn distance_meters(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Index of the route point closest to `target` and the distance to it.
///
/// Linear scan; on exact ties the lowest index wins. Returns `None` for an
/// empty route.
pub fn nearest_point_on_route(target: LatLon, route: &[LatLon]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, point) in route.iter().enumerate() {
        let dist = distance_meters(*point, target);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((idx, dist)),
        }
    }
    best
}

/// Degrees of latitude spanned by `meters` going north.
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_meters(LatLon::new(0.0, 0.0), LatLon::new(1.0, 0.0));
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = LatLon::new(52.5200, 13.4050);
        let b = LatLon::new(48.8566, 2.3522);
        let ab = distance_meters(a, b);
        let ba = distance_meters(b, a);
        assert!((ab - ba).abs() < 1e-6);
        assert_eq!(distance_meters(a, a), 0.0);
    }

    #[test]
    fn nearest_point_prefers_lowest_index_on_ties() {
        let route = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 0.01),
            LatLon::new(0.0, 0.0),
        ];
        let (idx, dist) = nearest_point_on_route(LatLon::new(0.0, 0.0), &route).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn nearest_point_on_empty_route_is_none() {
        assert!(nearest_point_on_route(LatLon::new(1.0, 1.0), &[]).is_none());
    }

    #[test]
    fn meters_to_lat_degrees_inverts_distance() {
        let deg = meters_to_lat_degrees(2000.0);
        let d = distance_meters(LatLon::new(10.0, 5.0), LatLon::new(10.0 + deg, 5.0));
        assert!((d - 2000.0).abs() < 1e-6);
    }
}
