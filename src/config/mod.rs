use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EnrichError;
use crate::overpass::DEFAULT_ENDPOINT;

/// Smallest sampling step accepted; denser sampling floods the service.
pub const MIN_DISTANCE_STEP: f64 = 500.0;

/// Extra client-side allowance on top of the server-side query timeout.
pub const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// Upper bound for every configured wait or timeout, in seconds.
pub const MAX_WAIT_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Meters between sample points.
    pub distance_step: f64,
    /// Meters around each sample point.
    pub search_radius: f64,
    /// Sample points per query.
    pub batch_size: usize,
    /// Additional attempts after a transient failure.
    pub retries: u32,
    /// Seconds before the first retry; doubles each attempt.
    pub retry_backoff: f64,
    /// Seconds between successful batches.
    pub batch_sleep: f64,
    /// Server-side query timeout in seconds.
    pub overpass_timeout: u64,
    pub nodes_only: bool,
    /// Batches in flight at once.
    pub concurrency: usize,
    pub endpoint: String,
    pub cache: CacheConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            distance_step: 1000.0,
            search_radius: 300.0,
            batch_size: 25,
            retries: 3,
            retry_backoff: 2.0,
            batch_sleep: 1.0,
            overpass_timeout: 90,
            nodes_only: false,
            concurrency: 1,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Seconds an entry stays usable.
    pub ttl: u64,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: 7 * 24 * 3600,
            dir: PathBuf::from(".route-amenities-cache"),
        }
    }
}

impl EnrichConfig {
    /// Reads a YAML file (if given) layered under `ROUTE_AMENITIES_*`
    /// environment variables; `__` separates nested keys.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("ROUTE_AMENITIES")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), EnrichError> {
        if !(self.distance_step >= MIN_DISTANCE_STEP) {
            return Err(EnrichError::InvalidConfig(format!(
                "distance_step must be at least {MIN_DISTANCE_STEP} m (got {})",
                self.distance_step
            )));
        }
        if !(self.search_radius > 0.0 && self.search_radius.is_finite()) {
            return Err(EnrichError::InvalidConfig(format!(
                "search_radius must be positive (got {})",
                self.search_radius
            )));
        }
        if self.batch_size == 0 {
            return Err(EnrichError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(EnrichError::InvalidConfig("concurrency must be at least 1".into()));
        }
        for (name, value) in [
            ("retry_backoff", self.retry_backoff),
            ("batch_sleep", self.batch_sleep),
        ] {
            if !(value >= 0.0 && value <= MAX_WAIT_SECS as f64) {
                return Err(EnrichError::InvalidConfig(format!(
                    "{name} must be between 0 and {MAX_WAIT_SECS} seconds (got {value})"
                )));
            }
        }
        if self.overpass_timeout == 0 || self.overpass_timeout > MAX_WAIT_SECS {
            return Err(EnrichError::InvalidConfig(format!(
                "overpass_timeout must be between 1 and {MAX_WAIT_SECS} seconds (got {})",
                self.overpass_timeout
            )));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_backoff).unwrap_or(Duration::ZERO)
    }

    pub fn batch_sleep(&self) -> Duration {
        Duration::try_from_secs_f64(self.batch_sleep).unwrap_or(Duration::ZERO)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.overpass_timeout).saturating_add(CLIENT_TIMEOUT_GRACE)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl)
    }
}
