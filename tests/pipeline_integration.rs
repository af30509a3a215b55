use geo_types::Point;
use gpx::{Gpx, Track, TrackSegment, Waypoint};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use route_amenities::geomath::{EARTH_RADIUS_M, distance_meters, meters_to_lat_degrees};
use route_amenities::route::sample_route;
use route_amenities::{
    CacheStore, CancelHandle, CancelToken, EnrichConfig, EnrichError, Enricher, GeodataClient,
    GeodataError, LatLon, QueryResult, RawNode, RawWay,
};

/// Serves scripted responses, then `fallback` forever.
struct StubClient {
    script: Mutex<VecDeque<Result<QueryResult, GeodataError>>>,
    fallback: QueryResult,
    calls: AtomicUsize,
}

impl StubClient {
    fn returning(fallback: QueryResult) -> Self {
        Self::scripted(Vec::new(), fallback)
    }

    fn scripted(script: Vec<Result<QueryResult, GeodataError>>, fallback: QueryResult) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeodataClient for StubClient {
    fn query(&self, query: &str, _timeout: Duration) -> Result<QueryResult, GeodataError> {
        assert!(query.starts_with("[out:json]"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}

fn test_config() -> EnrichConfig {
    let mut cfg = EnrichConfig {
        distance_step: 1000.0,
        retries: 2,
        retry_backoff: 0.001,
        batch_sleep: 0.0,
        ..EnrichConfig::default()
    };
    cfg.cache.enabled = false;
    cfg
}

fn track_from(points: &[LatLon]) -> Gpx {
    let mut segment = TrackSegment::new();
    for p in points {
        segment.points.push(Waypoint::new(Point::new(p.lon, p.lat)));
    }
    let mut track = Track::new();
    track.segments.push(segment);
    let mut gpx = Gpx::default();
    gpx.tracks.push(track);
    gpx
}

/// Straight northbound line from (0, 0) with a point every `spacing_m`.
fn straight_line(total_m: f64, spacing_m: f64) -> Vec<LatLon> {
    let n = (total_m / spacing_m).round() as usize;
    (0..=n)
        .map(|i| LatLon::new(meters_to_lat_degrees(i as f64 * spacing_m), 0.0))
        .collect()
}

fn east_of(p: LatLon, meters: f64) -> LatLon {
    let dlon = (meters / (EARTH_RADIUS_M * p.lat.to_radians().cos())).to_degrees();
    LatLon::new(p.lat, p.lon + dlon)
}

fn node(id: i64, at: LatLon, tags: &[(&str, &str)]) -> RawNode {
    RawNode {
        id,
        lat: at.lat,
        lon: at.lon,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[test]
fn two_points_2km_apart_yield_two_samples() {
    let points = straight_line(2000.0, 2000.0);
    assert_eq!(points.len(), 2);
    assert!((distance_meters(points[0], points[1]) - 2000.0).abs() < 1e-6);
    assert_eq!(sample_route(&points, 1000.0).len(), 2);
}

#[test]
fn feature_beside_route_midpoint_is_annotated() {
    let points = straight_line(2000.0, 100.0);
    let midpoint = points[10];
    let cafe = node(
        1,
        east_of(midpoint, 50.0),
        &[("amenity", "cafe"), ("name", "Joe's"), ("website", "joes.coffee")],
    );
    let client = StubClient::returning(QueryResult {
        nodes: vec![cafe],
        ways: Vec::new(),
    });
    let config = test_config();

    let enrichment = Enricher::new(&config, &client)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert_eq!(enrichment.waypoints.len(), 1);
    let wp = &enrichment.waypoints[0];
    assert!((wp.distances.off_route_m - 50.0).abs() < 0.5);
    assert!((wp.distances.from_start_km - 1.0).abs() < 1e-3);
    assert!((wp.distances.remaining_km - 1.0).abs() < 1e-3);
    assert_eq!(wp.name, "Joe's");
    assert!(wp.description.starts_with("cafe. Route km: 1.0, Remaining: 1.0km, Off route: 50m"));
    assert_eq!(wp.link.as_ref().unwrap().href, "https://joes.coffee");
    assert_eq!(wp.symbol, "Restaurant");

    let report = &enrichment.report;
    assert_eq!(report.track_points, 21);
    assert_eq!(report.batches_total, 1);
    assert_eq!(report.waypoints_added, 1);
    assert!(!report.cache_hit);
}

#[test]
fn duplicate_features_across_batches_produce_one_waypoint() {
    let points = straight_line(10_000.0, 500.0);
    let water = node(9, points[3], &[("amenity", "drinking_water")]);
    let client = StubClient::returning(QueryResult {
        nodes: vec![water.clone(), water],
        ways: Vec::new(),
    });
    let mut config = test_config();
    config.batch_size = 2;

    let enrichment = Enricher::new(&config, &client)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert!(client.calls() > 1);
    assert_eq!(enrichment.waypoints.len(), 1);
    assert_eq!(enrichment.waypoints[0].symbol, "Water Source");
}

#[test]
fn incomplete_way_is_skipped_without_error() {
    let points = straight_line(2000.0, 100.0);
    let client = StubClient::returning(QueryResult {
        nodes: Vec::new(),
        ways: vec![RawWay {
            id: 77,
            tags: [("amenity".to_string(), "fuel".to_string())].into(),
            center: None,
            geometry: None,
        }],
    });
    let config = test_config();

    let enrichment = Enricher::new(&config, &client)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert!(enrichment.waypoints.is_empty());
    assert_eq!(enrichment.report.ways, 0);
    assert_eq!(enrichment.report.skipped_ways, 1);
}

#[test]
fn nodes_are_emitted_before_ways() {
    let points = straight_line(2000.0, 100.0);
    let client = StubClient::returning(QueryResult {
        nodes: vec![node(2, points[15], &[("amenity", "pub")])],
        ways: vec![RawWay {
            id: 1,
            tags: [("amenity".to_string(), "fuel".to_string())].into(),
            center: Some(points[2]),
            geometry: None,
        }],
    });
    let config = test_config();

    let enrichment = Enricher::new(&config, &client)
        .enrich(&track_from(&points), None)
        .unwrap();

    let symbols: Vec<&str> = enrichment
        .waypoints
        .iter()
        .map(|w| w.symbol.as_str())
        .collect();
    assert_eq!(symbols, vec!["Restaurant", "Gas Station"]);
}

#[test]
fn retries_within_budget_recover_the_batch() {
    let points = straight_line(2000.0, 100.0);
    let rate_limited = || Err(GeodataError::RateLimited("429".into()));
    let client = StubClient::scripted(
        vec![rate_limited(), rate_limited()],
        QueryResult {
            nodes: vec![node(1, points[0], &[("amenity", "bar")])],
            ways: Vec::new(),
        },
    );
    let config = test_config();

    let enrichment = Enricher::new(&config, &client)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(enrichment.report.retries_used, 2);
    assert_eq!(enrichment.report.batches_failed, 0);
    assert_eq!(enrichment.waypoints.len(), 1);
}

#[test]
fn retries_exhausted_drop_the_batch_but_not_the_run() {
    let points = straight_line(2000.0, 100.0);
    let rate_limited = || Err(GeodataError::RateLimited("429".into()));
    let client = StubClient::scripted(
        vec![rate_limited(), rate_limited(), rate_limited()],
        QueryResult::default(),
    );
    let config = test_config();

    let enrichment = Enricher::new(&config, &client)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(enrichment.report.batches_failed, 1);
    assert!(enrichment.waypoints.is_empty());
}

#[test]
fn cache_hit_skips_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let points = straight_line(3000.0, 100.0);
    let track = track_from(&points);
    let config = test_config();
    let cache = CacheStore::new(dir.path(), Duration::from_secs(3600));

    let first_client = StubClient::returning(QueryResult {
        nodes: vec![node(5, points[20], &[("amenity", "toilets")])],
        ways: Vec::new(),
    });
    let first = Enricher::new(&config, &first_client)
        .with_cache(cache.clone())
        .enrich(&track, None)
        .unwrap();
    assert!(!first.report.cache_hit);
    assert_eq!(first_client.calls(), 1);

    let second_client = StubClient::returning(QueryResult::default());
    let second = Enricher::new(&config, &second_client)
        .with_cache(cache)
        .enrich(&track, None)
        .unwrap();

    assert!(second.report.cache_hit);
    assert_eq!(second_client.calls(), 0);
    assert_eq!(second.waypoints, first.waypoints);
}

#[test]
fn changed_parameters_miss_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let points = straight_line(3000.0, 100.0);
    let track = track_from(&points);
    let cache = CacheStore::new(dir.path(), Duration::from_secs(3600));
    let client = StubClient::returning(QueryResult::default());

    let config = test_config();
    Enricher::new(&config, &client)
        .with_cache(cache.clone())
        .enrich(&track, None)
        .unwrap();

    let mut wider = test_config();
    wider.search_radius = 500.0;
    let report = Enricher::new(&wider, &client)
        .with_cache(cache)
        .enrich(&track, None)
        .unwrap()
        .report;

    assert!(!report.cache_hit);
    assert_eq!(client.calls(), 2);
}

#[test]
fn failed_batches_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let points = straight_line(2000.0, 100.0);
    let track = track_from(&points);
    let cache = CacheStore::new(dir.path(), Duration::from_secs(3600));
    let config = test_config();

    let failing = StubClient::scripted(
        vec![Err(GeodataError::MalformedRequest("too big".into()))],
        QueryResult::default(),
    );
    Enricher::new(&config, &failing)
        .with_cache(cache.clone())
        .enrich(&track, None)
        .unwrap();

    let healthy = StubClient::returning(QueryResult::default());
    let report = Enricher::new(&config, &healthy)
        .with_cache(cache)
        .enrich(&track, None)
        .unwrap()
        .report;
    assert!(!report.cache_hit);
    assert_eq!(healthy.calls(), 1);
}

#[test]
fn cancel_before_first_batch_returns_empty_result() {
    let points = straight_line(2000.0, 100.0);
    let (handle, token) = CancelToken::pair();
    drop(handle);
    let client = StubClient::returning(QueryResult::default());
    let config = test_config();

    let enrichment = Enricher::new(&config, &client)
        .with_cancel(token)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert!(enrichment.report.cancelled);
    assert_eq!(client.calls(), 0);
    assert!(enrichment.waypoints.is_empty());
}

/// Returns one distinct cafe per call and fires the cancel handle during
/// call number `cancel_on`.
struct CancellingClient {
    handle: Mutex<Option<CancelHandle>>,
    cancel_on: usize,
    at: LatLon,
    calls: AtomicUsize,
}

impl GeodataClient for CancellingClient {
    fn query(&self, _query: &str, _timeout: Duration) -> Result<QueryResult, GeodataError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on
            && let Some(mut handle) = self.handle.lock().unwrap().take()
        {
            handle.cancel();
        }
        Ok(QueryResult {
            nodes: vec![node(call as i64, self.at, &[("amenity", "cafe")])],
            ways: Vec::new(),
        })
    }
}

#[test]
fn cancel_mid_run_keeps_features_gathered_so_far() {
    // 1100 m spacing keeps every point as a sample: six single-sample batches.
    let points = straight_line(5500.0, 1100.0);
    let (handle, token) = CancelToken::pair();
    let client = CancellingClient {
        handle: Mutex::new(Some(handle)),
        cancel_on: 2,
        at: points[0],
        calls: AtomicUsize::new(0),
    };
    let mut config = test_config();
    config.batch_size = 1;
    config.batch_sleep = 2.0;

    let start = Instant::now();
    let enrichment = Enricher::new(&config, &client)
        .with_cancel(token)
        .enrich(&track_from(&points), None)
        .unwrap();
    let elapsed = start.elapsed();

    let report = &enrichment.report;
    assert!(report.cancelled);
    assert_eq!(report.batches_total, 6);
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    assert_eq!(enrichment.waypoints.len(), 2);
    // one pause after batch 1; the full run would pause five times
    assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");
}

#[test]
fn cancelled_run_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let points = straight_line(5500.0, 1100.0);
    let track = track_from(&points);
    let cache = CacheStore::new(dir.path(), Duration::from_secs(3600));
    let (handle, token) = CancelToken::pair();
    let client = CancellingClient {
        handle: Mutex::new(Some(handle)),
        cancel_on: 1,
        at: points[0],
        calls: AtomicUsize::new(0),
    };
    let mut config = test_config();
    config.batch_size = 1;

    Enricher::new(&config, &client)
        .with_cache(cache.clone())
        .with_cancel(token)
        .enrich(&track, None)
        .unwrap();

    let healthy = StubClient::returning(QueryResult::default());
    let report = Enricher::new(&config, &healthy)
        .with_cache(cache)
        .enrich(&track, None)
        .unwrap()
        .report;
    assert!(!report.cache_hit);
    assert_eq!(healthy.calls(), 6);
}

#[test]
fn empty_track_is_an_input_error() {
    let client = StubClient::returning(QueryResult::default());
    let config = test_config();
    let result = Enricher::new(&config, &client).enrich(&Gpx::default(), None);
    assert!(matches!(result, Err(EnrichError::EmptyTrack)));
    assert_eq!(client.calls(), 0);
}

#[test]
fn parallel_batches_match_sequential_result() {
    let points = straight_line(20_000.0, 250.0);
    let fallback = QueryResult {
        nodes: (0..5)
            .map(|i| node(i, points[i as usize * 10], &[("amenity", "cafe")]))
            .collect(),
        ways: Vec::new(),
    };
    let mut config = test_config();
    config.batch_size = 3;

    let sequential_client = StubClient::returning(fallback.clone());
    let sequential = Enricher::new(&config, &sequential_client)
        .enrich(&track_from(&points), None)
        .unwrap();

    config.concurrency = 4;
    let parallel_client = StubClient::returning(fallback);
    let parallel = Enricher::new(&config, &parallel_client)
        .enrich(&track_from(&points), None)
        .unwrap();

    assert_eq!(sequential_client.calls(), parallel_client.calls());
    assert_eq!(sequential.waypoints, parallel.waypoints);
    assert_eq!(parallel.waypoints.len(), 5);
}
