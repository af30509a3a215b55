use crate::geomath::{LatLon, distance_meters};

/// Greedy forward scan keeping points at least `distance_step` meters from
/// the previously kept one. The first point is always kept.
pub fn sample_route(points: &[LatLon], distance_step: f64) -> Vec<LatLon> {
    let mut sampled: Vec<LatLon> = Vec::new();
    for point in points {
        let keep = match sampled.last() {
            None => true,
            Some(last) => distance_meters(*last, *point) >= distance_step,
        };
        if keep {
            sampled.push(*point);
        }
    }
    sampled
}
