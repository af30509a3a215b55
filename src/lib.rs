//! Enrich GPS tracks with nearby points of interest from OpenStreetMap.
//!
//! The track is down-sampled, the samples are queried against an Overpass
//! endpoint in batches (with retry, pacing and an on-disk cache), returned
//! features are deduplicated, and each one becomes a waypoint annotated with
//! its along-route position.

pub mod app;
pub mod config;
pub mod error;
pub mod features;
pub mod geomath;
pub mod overpass;
pub mod pipeline;
pub mod route;
pub mod sinks;
pub mod storage;
pub mod utils;
pub mod waypoints;

pub use config::EnrichConfig;
pub use error::{EnrichError, GeodataError};
pub use features::{Feature, FeatureKind, FeatureSet};
pub use geomath::LatLon;
pub use overpass::{GeodataClient, OverpassClient, QueryResult, RawNode, RawWay};
pub use pipeline::{CancelHandle, CancelToken, EnrichReport, Enricher, Enrichment};
pub use storage::CacheStore;
pub use waypoints::OutputWaypoint;
