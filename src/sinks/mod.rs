use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::waypoints::OutputWaypoint;

pub mod geojson;
pub mod gpx;

pub use self::geojson::GeoJsonSink;
pub use self::gpx::GpxSink;

/// Destination for the enriched track.
pub trait TrackSink: Send {
    fn add_waypoint(&mut self, waypoint: OutputWaypoint) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Writes through a temp file next to `path` and renames it into place.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Sink: Failed to create temporary file in {:?}", dir))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.persist(path)
        .with_context(|| format!("Sink: Failed to move output into {:?}", path))?;
    Ok(())
}
