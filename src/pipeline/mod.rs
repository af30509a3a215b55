//! End-to-end enrichment: sample the track, fetch features (or reuse the
//! cache), annotate distances and synthesize waypoints.

mod batcher;
mod cancel;

pub use batcher::{
    BatchOutcome, BatchPolicy, DispatchLimiter, FetchSummary, backoff_delay, fetch_features,
    fetch_with_retry,
};
pub use cancel::{CancelHandle, CancelToken};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::config::EnrichConfig;
use crate::error::{EnrichError, Result};
use crate::features::FeatureSet;
use crate::overpass::{GeodataClient, QuerySpec, amenity_filter};
use crate::route::{RouteIndex, sample_route, track_points};
use crate::storage::{CacheKeyParams, CacheStore, SourceIdentity, cache_key};
use crate::utils::ProgressCounter;
use crate::waypoints::{OutputWaypoint, synthesize_all};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichReport {
    pub track_points: usize,
    pub sample_points: usize,
    pub route_length_km: f64,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub retries_used: u32,
    pub cache_hit: bool,
    pub cancelled: bool,
    pub nodes: usize,
    pub ways: usize,
    /// Ways dropped for missing node data.
    pub skipped_ways: usize,
    pub waypoints_added: usize,
}

#[derive(Debug, Clone)]
pub struct Enrichment {
    pub waypoints: Vec<OutputWaypoint>,
    pub route: RouteIndex,
    pub report: EnrichReport,
}

pub fn read_track(path: &Path) -> Result<gpx::Gpx> {
    let file = File::open(path)?;
    Ok(gpx::read(BufReader::new(file))?)
}

pub struct Enricher<'a> {
    config: &'a EnrichConfig,
    client: &'a dyn GeodataClient,
    cache: CacheStore,
    cancel: CancelToken,
    show_progress: bool,
}

impl<'a> Enricher<'a> {
    /// Uses the cache described by `config.cache`.
    pub fn new(config: &'a EnrichConfig, client: &'a dyn GeodataClient) -> Self {
        let cache = if config.cache.enabled {
            CacheStore::new(&config.cache.dir, config.cache_ttl())
        } else {
            CacheStore::disabled()
        };
        Self {
            config,
            client,
            cache,
            cancel: CancelToken::never(),
            show_progress: false,
        }
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn policy(&self) -> BatchPolicy {
        BatchPolicy {
            batch_size: self.config.batch_size,
            retries: self.config.retries,
            retry_backoff: self.config.retry_backoff(),
            batch_sleep: self.config.batch_sleep(),
            client_timeout: self.config.client_timeout(),
            concurrency: self.config.concurrency,
        }
    }

    fn query_spec(&self) -> QuerySpec {
        QuerySpec {
            search_radius: self.config.search_radius,
            nodes_only: self.config.nodes_only,
            server_timeout_secs: self.config.overpass_timeout,
        }
    }

    pub fn enrich_file(&self, path: &Path) -> Result<(gpx::Gpx, Enrichment)> {
        let track = read_track(path)?;
        let source = SourceIdentity::from_path(path)?;
        let enrichment = self.enrich(&track, Some(&source))?;
        Ok((track, enrichment))
    }

    pub fn enrich(&self, track: &gpx::Gpx, source: Option<&SourceIdentity>) -> Result<Enrichment> {
        self.config.validate()?;

        let points = track_points(track);
        if points.is_empty() {
            return Err(EnrichError::EmptyTrack);
        }
        let samples = sample_route(&points, self.config.distance_step);
        tracing::info!(
            "Pipeline: Sampled {} of {} track points (step {} m)",
            samples.len(),
            points.len(),
            self.config.distance_step
        );

        let spec = self.query_spec();
        let filter = amenity_filter();
        let key = cache_key(&CacheKeyParams {
            source,
            distance_step: self.config.distance_step,
            search_radius: self.config.search_radius,
            amenity_filter: &filter,
            scope: spec.scope(),
            samples: &samples,
        });

        let mut report = EnrichReport {
            track_points: points.len(),
            sample_points: samples.len(),
            ..EnrichReport::default()
        };

        let features = match self.cache.load(&key) {
            Some(entry) => {
                report.cache_hit = true;
                FeatureSet::from_features(entry.features)
            }
            None => {
                let summary =
                    fetch_features(self.client, &samples, &spec, &self.policy(), &self.cancel)?;
                report.batches_total = summary.batches_total;
                report.batches_failed = summary.batches_failed;
                report.retries_used = summary.retries_used;
                report.cancelled = summary.cancelled;
                if summary.cancelled || summary.batches_failed > 0 {
                    tracing::info!("Cache: not storing incomplete result");
                } else {
                    self.cache.save(&key, &summary.features.to_vec());
                }
                summary.features
            }
        };
        report.nodes = features.node_count();
        report.ways = features.way_count();
        report.skipped_ways = features.skipped_ways();

        let route = RouteIndex::new(points);
        report.route_length_km = route.total_length_m() / 1000.0;
        tracing::info!(
            "Pipeline: {} nodes, {} ways ({} skipped) along {:.1} km",
            report.nodes,
            report.ways,
            report.skipped_ways,
            report.route_length_km
        );

        let progress = self
            .show_progress
            .then(|| ProgressCounter::new("Synthesizing waypoints", 50));
        let waypoints = synthesize_all(&features, &route, progress.as_ref());
        if let Some(progress) = &progress {
            progress.finish();
        }
        report.waypoints_added = waypoints.len();

        Ok(Enrichment {
            waypoints,
            route,
            report,
        })
    }
}
