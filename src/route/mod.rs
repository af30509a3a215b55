//! Track geometry: point extraction, down-sampling and along-route distances.

mod annotator;
mod sampler;

pub use annotator::{RouteDistances, RouteIndex};
pub use sampler::sample_route;

use crate::geomath::LatLon;

/// Every track point of every segment, concatenated in file order.
pub fn track_points(gpx: &gpx::Gpx) -> Vec<LatLon> {
    gpx.tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(|wpt| {
            let point = wpt.point();
            LatLon::new(point.y(), point.x())
        })
        .collect()
}
