//! Overpass query construction and the geodata client seam.

mod http;

pub use http::{DEFAULT_ENDPOINT, OverpassClient};

use std::fmt::Write as _;
use std::time::Duration;

use crate::error::GeodataError;
use crate::features::Tags;
use crate::geomath::LatLon;

/// Amenity values matched by every query.
pub const AMENITY_CATEGORIES: [&str; 8] = [
    "cafe",
    "restaurant",
    "pub",
    "bar",
    "fast_food",
    "toilets",
    "drinking_water",
    "fuel",
];

/// Anchored regex for the `amenity` tag filter.
pub fn amenity_filter() -> String {
    format!("^({})$", AMENITY_CATEGORIES.join("|"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
}

/// A way as returned by the service. `center` is present when the query asks
/// for it; `geometry` entries are `None` for nodes the server did not resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWay {
    pub id: i64,
    pub tags: Tags,
    pub center: Option<LatLon>,
    pub geometry: Option<Vec<Option<LatLon>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
}

/// Backend able to run an Overpass QL query.
pub trait GeodataClient: Send + Sync {
    fn query(&self, query: &str, timeout: Duration) -> Result<QueryResult, GeodataError>;
}

/// What a single batch query asks for.
#[derive(Debug, Clone, Copy)]
pub struct QuerySpec {
    pub search_radius: f64,
    pub nodes_only: bool,
    pub server_timeout_secs: u64,
}

impl QuerySpec {
    /// Short description of the query shape, part of the cache key.
    pub fn scope(&self) -> &'static str {
        if self.nodes_only {
            "nodes+bicycle_shops"
        } else {
            "nodes+ways+bicycle_shops"
        }
    }
}

/// Union query over every point of one batch.
pub fn build_query(points: &[LatLon], spec: &QuerySpec) -> String {
    let filter = amenity_filter();
    let radius = spec.search_radius;
    let mut body = String::new();
    for p in points {
        let around = format!("(around:{radius},{:.7},{:.7})", p.lat, p.lon);
        let _ = writeln!(body, "  node[\"amenity\"~\"{filter}\"]{around};");
        if !spec.nodes_only {
            let _ = writeln!(body, "  way[\"amenity\"~\"{filter}\"]{around};");
        }
        let _ = writeln!(body, "  node[\"shop\"=\"bicycle\"]{around};");
    }
    format!(
        "[out:json][timeout:{}];\n(\n{body});\nout center;",
        spec.server_timeout_secs
    )
}
