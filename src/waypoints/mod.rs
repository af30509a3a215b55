//! Turns deduplicated features into annotated output waypoints.

mod link;

pub use link::{WaypointLink, normalize_link};

use rayon::prelude::*;

use crate::features::{Feature, FeatureSet, Tags};
use crate::route::{RouteDistances, RouteIndex};
use crate::utils::{ProgressCounter, first_tag};

/// Tags naming the feature's category, in priority order.
pub const CATEGORY_KEYS: [&str; 2] = ["amenity", "shop"];
/// Tags holding a website, in priority order.
pub const WEBSITE_KEYS: [&str; 3] = ["website", "contact:website", "url"];

const FALLBACK_NAME: &str = "Amenity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmenityCategory {
    Cafe,
    Restaurant,
    Pub,
    Bar,
    FastFood,
    Toilets,
    DrinkingWater,
    Fuel,
    Bicycle,
    /// Any other value, kept verbatim.
    Unknown(String),
}

impl AmenityCategory {
    pub fn from_value(value: &str) -> Self {
        match value {
            "cafe" => Self::Cafe,
            "restaurant" => Self::Restaurant,
            "pub" => Self::Pub,
            "bar" => Self::Bar,
            "fast_food" => Self::FastFood,
            "toilets" => Self::Toilets,
            "drinking_water" => Self::DrinkingWater,
            "fuel" => Self::Fuel,
            "bicycle" => Self::Bicycle,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// GPX `<sym>` value.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Cafe | Self::Restaurant | Self::Pub | Self::Bar | Self::FastFood => "Restaurant",
            Self::Toilets => "Restroom",
            Self::DrinkingWater => "Water Source",
            Self::Fuel => "Gas Station",
            Self::Bicycle => "Bike Trail",
            Self::Unknown(_) => "Waypoint",
        }
    }

    /// GPX `<type>` value.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cafe | Self::Restaurant | Self::Pub | Self::Bar | Self::FastFood => {
                "Food & Drink"
            }
            Self::Toilets | Self::DrinkingWater => "Facilities",
            Self::Fuel | Self::Bicycle => "Transportation",
            Self::Unknown(_) => "Amenity",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputWaypoint {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub description: String,
    /// Raw `amenity`/`shop` value, if any.
    pub amenity: Option<String>,
    pub symbol: String,
    pub category: String,
    pub link: Option<WaypointLink>,
    pub distances: RouteDistances,
}

/// `amenity`/`shop` values joined for display, without the `key=` prefix.
pub fn category_summary(tags: &Tags) -> String {
    tags.iter()
        .filter(|(key, _)| CATEGORY_KEYS.contains(&key.as_str()))
        .map(|(_, value)| value.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn describe(summary: &str, distances: &RouteDistances, website: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(3);
    if !summary.is_empty() {
        parts.push(summary.to_string());
    }
    parts.push(format!(
        "Route km: {:.1}, Remaining: {:.1}km, Off route: {:.0}m",
        distances.from_start_km, distances.remaining_km, distances.off_route_m
    ));
    if let Some(url) = website {
        parts.push(format!("Website: {url}"));
    }
    parts.join(". ")
}

pub fn synthesize(feature: &Feature, route: &RouteIndex) -> OutputWaypoint {
    let tags = &feature.tags;
    let amenity = first_tag(tags, &CATEGORY_KEYS);
    let category = amenity.map_or(AmenityCategory::Unknown(String::new()), AmenityCategory::from_value);
    let distances = route.distances_for(feature.position());
    let link = first_tag(tags, &WEBSITE_KEYS).and_then(normalize_link);
    let description = describe(
        &category_summary(tags),
        &distances,
        link.as_ref().map(|l| l.href.as_str()),
    );

    OutputWaypoint {
        lat: feature.lat,
        lon: feature.lon,
        name: tags
            .get("name")
            .cloned()
            .unwrap_or_else(|| FALLBACK_NAME.to_string()),
        description,
        amenity: amenity.map(str::to_string),
        symbol: category.symbol().to_string(),
        category: category.label().to_string(),
        link,
        distances,
    }
}

/// One waypoint per feature, nodes before ways, in aggregate order.
pub fn synthesize_all(
    features: &FeatureSet,
    route: &RouteIndex,
    progress: Option<&ProgressCounter>,
) -> Vec<OutputWaypoint> {
    let features: Vec<&Feature> = features.iter().collect();
    features
        .par_iter()
        .map(|feature| {
            let waypoint = synthesize(feature, route);
            if let Some(progress) = progress {
                progress.inc(1);
            }
            waypoint
        })
        .collect()
}
