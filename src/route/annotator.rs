use crate::geomath::{LatLon, distance_meters, nearest_point_on_route};

/// Along-route position of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RouteDistances {
    pub from_start_km: f64,
    pub remaining_km: f64,
    pub off_route_m: f64,
}

/// Full-resolution route with its cumulative distance table.
#[derive(Debug, Clone)]
pub struct RouteIndex {
    points: Vec<LatLon>,
    cumulative: Vec<f64>,
}

impl RouteIndex {
    pub fn new(points: Vec<LatLon>) -> Self {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (idx, point) in points.iter().enumerate() {
            if idx > 0 {
                total += distance_meters(points[idx - 1], *point);
            }
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    pub fn points(&self) -> &[LatLon] {
        &self.points
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn total_length_m(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn distances_for(&self, target: LatLon) -> RouteDistances {
        let Some((closest, off_route_m)) = nearest_point_on_route(target, &self.points) else {
            return RouteDistances::default();
        };
        let along = self.cumulative[closest];
        RouteDistances {
            from_start_km: along / 1000.0,
            remaining_km: (self.total_length_m() - along) / 1000.0,
            off_route_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geomath::meters_to_lat_degrees;

    fn straight_route(n: usize, spacing_m: f64) -> Vec<LatLon> {
        let step = meters_to_lat_degrees(spacing_m);
        (0..n).map(|i| LatLon::new(i as f64 * step, 0.0)).collect()
    }

    #[test]
    fn cumulative_table_is_monotone_and_sums_segments() {
        let points = vec![
            LatLon::new(46.0, 7.0),
            LatLon::new(46.01, 7.02),
            LatLon::new(46.01, 7.02),
            LatLon::new(45.99, 7.05),
        ];
        let index = RouteIndex::new(points.clone());
        let table = index.cumulative();

        assert_eq!(table.len(), points.len());
        assert_eq!(table[0], 0.0);
        assert!(table.windows(2).all(|w| w[1] >= w[0]));

        let direct: f64 = points
            .windows(2)
            .map(|w| distance_meters(w[0], w[1]))
            .sum();
        assert!((index.total_length_m() - direct).abs() < 1e-9);
    }

    #[test]
    fn empty_route_reports_zero_distances() {
        let index = RouteIndex::new(Vec::new());
        assert_eq!(index.total_length_m(), 0.0);
        assert_eq!(
            index.distances_for(LatLon::new(1.0, 1.0)),
            RouteDistances::default()
        );
    }

    #[test]
    fn feature_beside_midpoint_splits_route() {
        let index = RouteIndex::new(straight_route(3, 1000.0));
        let mid = index.points()[1];
        // ~50 m east of the midpoint
        let lon_offset = (50.0 / (crate::geomath::EARTH_RADIUS_M * mid.lat.to_radians().cos()))
            .to_degrees();
        let d = index.distances_for(LatLon::new(mid.lat, mid.lon + lon_offset));

        assert!((d.from_start_km - 1.0).abs() < 1e-6);
        assert!((d.remaining_km - 1.0).abs() < 1e-6);
        assert!((d.off_route_m - 50.0).abs() < 0.5, "got {}", d.off_route_m);
    }
}
