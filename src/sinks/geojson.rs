use super::{TrackSink, write_atomically};
use anyhow::Result;
use geo_types::{LineString, Point};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

use crate::geomath::LatLon;
use crate::waypoints::OutputWaypoint;

/// FeatureCollection holding the route line followed by one point per
/// waypoint.
pub struct GeoJsonSink {
    path: PathBuf,
    features: Vec<Feature>,
}

impl GeoJsonSink {
    pub fn new<P: AsRef<Path>>(path: P, route: &[LatLon]) -> Self {
        let mut features = Vec::new();
        if route.len() >= 2 {
            let line: LineString<f64> = route.iter().map(|p| (p.lon, p.lat)).collect();
            let mut properties = Map::new();
            properties.insert("kind".to_string(), Value::from("route"));
            features.push(Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&line))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            });
        }
        Self {
            path: path.as_ref().to_path_buf(),
            features,
        }
    }
}

fn waypoint_properties(wp: &OutputWaypoint) -> Map<String, Value> {
    let value = json!({
        "kind": "waypoint",
        "name": wp.name,
        "description": wp.description,
        "amenity": wp.amenity,
        "symbol": wp.symbol,
        "category": wp.category,
        "link": wp.link.as_ref().map(|l| l.href.clone()),
        "route_km": wp.distances.from_start_km,
        "remaining_km": wp.distances.remaining_km,
        "off_route_m": wp.distances.off_route_m,
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl TrackSink for GeoJsonSink {
    fn add_waypoint(&mut self, waypoint: OutputWaypoint) -> Result<()> {
        let point = Point::new(waypoint.lon, waypoint.lat);
        self.features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&point))),
            id: None,
            properties: Some(waypoint_properties(&waypoint)),
            foreign_members: None,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let collection = GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features: std::mem::take(&mut self.features),
            foreign_members: None,
        });
        write_atomically(&self.path, |writer| {
            serde_json::to_writer(writer, &collection)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteDistances;

    fn waypoint(name: &str) -> OutputWaypoint {
        OutputWaypoint {
            lat: 46.0,
            lon: 7.0,
            name: name.to_string(),
            description: "water".to_string(),
            amenity: Some("drinking_water".to_string()),
            symbol: "Water Source".to_string(),
            category: "Facilities".to_string(),
            link: None,
            distances: RouteDistances {
                from_start_km: 1.5,
                remaining_km: 0.5,
                off_route_m: 12.0,
            },
        }
    }

    #[test]
    fn writes_route_and_waypoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let route = vec![LatLon::new(46.0, 7.0), LatLon::new(46.01, 7.01)];
        let mut sink = GeoJsonSink::new(&path, &route);
        sink.add_waypoint(waypoint("Fountain")).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        let features = parsed["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[1]["geometry"]["type"], "Point");
        assert_eq!(features[1]["properties"]["name"], "Fountain");
        assert_eq!(features[1]["properties"]["route_km"], 1.5);
        assert!(features[1]["properties"]["link"].is_null());
    }

    #[test]
    fn single_point_route_has_no_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let mut sink = GeoJsonSink::new(&path, &[LatLon::new(1.0, 2.0)]);
        sink.finish().unwrap();

        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed["features"].as_array().unwrap().is_empty());
    }
}
