use super::{TrackSink, write_atomically};
use anyhow::{Context, Result};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Link, Waypoint};
use std::path::{Path, PathBuf};

use crate::waypoints::OutputWaypoint;

pub const CREATOR: &str = "route-amenities";

pub fn to_gpx_waypoint(wp: &OutputWaypoint) -> Waypoint {
    let mut waypoint = Waypoint::new(Point::new(wp.lon, wp.lat));
    waypoint.name = Some(wp.name.clone());
    waypoint.description = Some(wp.description.clone());
    waypoint.symbol = Some(wp.symbol.clone());
    waypoint.type_ = Some(wp.category.clone());
    if let Some(link) = &wp.link {
        waypoint.links.push(Link {
            href: link.href.clone(),
            text: Some(link.text.clone()),
            ..Default::default()
        });
    }
    waypoint
}

/// The input document with the new waypoints appended, as GPX 1.1.
pub fn annotate_gpx(input: &Gpx, waypoints: &[OutputWaypoint]) -> Gpx {
    let mut output = input.clone();
    output.version = GpxVersion::Gpx11;
    output.creator = Some(CREATOR.to_string());
    output
        .waypoints
        .extend(waypoints.iter().map(to_gpx_waypoint));
    output
}

pub struct GpxSink {
    path: PathBuf,
    document: Gpx,
}

impl GpxSink {
    pub fn new<P: AsRef<Path>>(path: P, input: &Gpx) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            document: annotate_gpx(input, &[]),
        }
    }
}

impl TrackSink for GpxSink {
    fn add_waypoint(&mut self, waypoint: OutputWaypoint) -> Result<()> {
        self.document.waypoints.push(to_gpx_waypoint(&waypoint));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        write_atomically(&self.path, |writer| {
            gpx::write(&self.document, writer).context("Sink: Failed to encode GPX")
        })
    }
}
