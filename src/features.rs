//! Point-of-interest features and the dedup-merging aggregate built from
//! per-batch query results.

use geo::Centroid;
use geo_types::{MultiPoint, Point};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::geomath::LatLon;
use crate::overpass::{QueryResult, RawWay};

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Node,
    Way,
}

/// Identity of a feature across batches and runs.
pub type FeatureKey = (FeatureKind, i64);

/// A node, or a way reduced to its centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub kind: FeatureKind,
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: Tags,
}

impl Feature {
    pub fn key(&self) -> FeatureKey {
        (self.kind, self.id)
    }

    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Centroid of a way: the server-provided center if any, otherwise the mean
/// of its node coordinates. `None` when node data is missing.
pub fn way_centroid(way: &RawWay) -> Option<LatLon> {
    if let Some(center) = way.center {
        return Some(center);
    }
    let nodes = way.geometry.as_ref()?;
    let points: Option<Vec<Point<f64>>> = nodes
        .iter()
        .map(|node| node.map(|c| Point::new(c.lon, c.lat)))
        .collect();
    let centroid = MultiPoint::new(points?).centroid()?;
    Some(LatLon::new(centroid.y(), centroid.x()))
}

/// Deduplicated features, nodes and ways each in first-seen order.
///
/// Merging is first-write-wins on `(kind, id)`, so folding the same batch
/// twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    nodes: Vec<Feature>,
    ways: Vec<Feature>,
    seen: HashSet<FeatureKey>,
    skipped_ways: HashSet<i64>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_features<I: IntoIterator<Item = Feature>>(features: I) -> Self {
        let mut set = Self::new();
        for feature in features {
            set.insert(feature);
        }
        set
    }

    /// Returns false if a feature with the same key was already present.
    pub fn insert(&mut self, feature: Feature) -> bool {
        if !self.seen.insert(feature.key()) {
            return false;
        }
        match feature.kind {
            FeatureKind::Node => self.nodes.push(feature),
            FeatureKind::Way => self.ways.push(feature),
        }
        true
    }

    pub fn merge(mut self, result: QueryResult, nodes_only: bool) -> Self {
        for node in result.nodes {
            self.insert(Feature {
                kind: FeatureKind::Node,
                id: node.id,
                lat: node.lat,
                lon: node.lon,
                tags: node.tags,
            });
        }
        if nodes_only {
            return self;
        }
        for way in result.ways {
            if self.seen.contains(&(FeatureKind::Way, way.id)) {
                continue;
            }
            let Some(centroid) = way_centroid(&way) else {
                tracing::debug!("Aggregate: Skipping way {} with incomplete node data", way.id);
                self.skipped_ways.insert(way.id);
                continue;
            };
            self.skipped_ways.remove(&way.id);
            self.insert(Feature {
                kind: FeatureKind::Way,
                id: way.id,
                lat: centroid.lat,
                lon: centroid.lon,
                tags: way.tags,
            });
        }
        self
    }

    /// Nodes first, then ways.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.nodes.iter().chain(self.ways.iter())
    }

    pub fn to_vec(&self) -> Vec<Feature> {
        self.iter().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// Distinct ways dropped for incomplete node data.
    pub fn skipped_ways(&self) -> usize {
        self.skipped_ways.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
