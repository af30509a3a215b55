use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::EnrichConfig;
use crate::overpass::OverpassClient;
use crate::pipeline::{EnrichReport, Enricher};
use crate::sinks::{GeoJsonSink, GpxSink, TrackSink};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input GPX file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (default: <input>_amenities.<ext>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format (auto-detected from the output extension if omitted)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Meters between sample points
    #[arg(short = 'd', long)]
    pub distance_step: Option<f64>,

    /// Search radius around each sample point in meters
    #[arg(short = 'r', long)]
    pub search_radius: Option<f64>,

    /// Sample points per Overpass query
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Retries per batch on transient errors
    #[arg(long)]
    pub retries: Option<u32>,

    /// Initial retry backoff in seconds
    #[arg(long)]
    pub retry_backoff: Option<f64>,

    /// Pause between successful batches in seconds
    #[arg(long)]
    pub batch_sleep: Option<f64>,

    /// Server-side query timeout in seconds
    #[arg(long)]
    pub overpass_timeout: Option<u64>,

    /// Query nodes only (skip ways)
    #[arg(long)]
    pub nodes_only: bool,

    /// Batches in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Disable the on-disk result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Cache time-to-live in seconds
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Overpass interpreter URL
    #[arg(long, env = "OVERPASS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum OutputFormat {
    #[value(name = "gpx")]
    Gpx,
    #[value(name = "geojson", alias = "json")]
    GeoJson,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gpx => "gpx",
            OutputFormat::GeoJson => "geojson",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "gpx" => Some(OutputFormat::Gpx),
            "geojson" | "json" => Some(OutputFormat::GeoJson),
            _ => None,
        }
    }
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<EnrichConfig> {
        let mut cfg = EnrichConfig::load(self.config.as_deref())
            .context("CLI: Failed to load configuration")?;
        if let Some(v) = self.distance_step {
            cfg.distance_step = v;
        }
        if let Some(v) = self.search_radius {
            cfg.search_radius = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.retries {
            cfg.retries = v;
        }
        if let Some(v) = self.retry_backoff {
            cfg.retry_backoff = v;
        }
        if let Some(v) = self.batch_sleep {
            cfg.batch_sleep = v;
        }
        if let Some(v) = self.overpass_timeout {
            cfg.overpass_timeout = v;
        }
        if let Some(v) = self.concurrency {
            cfg.concurrency = v;
        }
        if let Some(v) = &self.endpoint {
            cfg.endpoint = v.clone();
        }
        if let Some(v) = &self.cache_dir {
            cfg.cache.dir = v.clone();
        }
        if let Some(v) = self.cache_ttl {
            cfg.cache.ttl = v;
        }
        if self.nodes_only {
            cfg.nodes_only = true;
        }
        if self.no_cache {
            cfg.cache.enabled = false;
        }
        cfg.validate().context("CLI: Invalid configuration")?;
        Ok(cfg)
    }

    pub fn resolve_output(&self) -> (PathBuf, OutputFormat) {
        let format = self
            .format
            .or_else(|| self.output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Gpx);
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input, format));
        (output, format)
    }
}

/// `<dir>/<stem>_amenities.<ext>` next to the input.
pub fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    input.with_file_name(format!("{stem}_amenities.{}", format.extension()))
}

pub fn run(cli: &Cli) -> Result<EnrichReport> {
    let config = cli.resolve_config()?;
    let (output, format) = cli.resolve_output();
    tracing::info!("Sink: {:?} -> {:?}", format, output);

    let client = OverpassClient::new(&config.endpoint)
        .context("CLI: Failed to initialize Overpass client")?;
    tracing::info!("Overpass: endpoint {}", client.endpoint());

    let enricher = Enricher::new(&config, &client).with_progress(cli.verbose);
    let (track, enrichment) = enricher
        .enrich_file(&cli.input)
        .with_context(|| format!("Pipeline: Failed to enrich {:?}", cli.input))?;

    let mut sink: Box<dyn TrackSink> = match format {
        OutputFormat::Gpx => Box::new(GpxSink::new(&output, &track)),
        OutputFormat::GeoJson => Box::new(GeoJsonSink::new(&output, enrichment.route.points())),
    };
    for waypoint in enrichment.waypoints {
        sink.add_waypoint(waypoint)?;
    }
    sink.finish()
        .with_context(|| format!("Pipeline: Failed to write {:?}", output))?;

    Ok(enrichment.report)
}
