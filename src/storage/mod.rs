//! On-disk cache of aggregated query results.
//!
//! One JSON file per cache key. Entries are written whole through a temp
//! file in the cache directory and renamed into place, so readers never see
//! a partial entry; concurrent writers of the same key race and the last
//! rename wins. Every I/O or decoding failure is logged and reported to the
//! caller as a miss (load) or ignored (save).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::features::Feature;
use crate::geomath::LatLon;

/// Bumped whenever the entry layout or query semantics change.
pub const CACHE_FORMAT_VERSION: &str = "route-amenities-cache-v1";

/// Identity of the input file: canonical path, modification time and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub path: PathBuf,
    pub modified_nanos: u128,
    pub size: u64,
}

impl SourceIdentity {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified_nanos = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(Self {
            path: fs::canonicalize(path)?,
            modified_nanos,
            size: metadata.len(),
        })
    }
}

/// Everything that influences the query output.
#[derive(Debug, Clone)]
pub struct CacheKeyParams<'a> {
    pub source: Option<&'a SourceIdentity>,
    pub distance_step: f64,
    pub search_radius: f64,
    pub amenity_filter: &'a str,
    pub scope: &'a str,
    pub samples: &'a [LatLon],
}

/// Hex SHA-256 over the versioned parameter list and a digest of the sample
/// coordinates at 7 decimals.
pub fn cache_key(params: &CacheKeyParams<'_>) -> String {
    let mut samples = Sha256::new();
    for p in params.samples {
        samples.update(format!("{:.7},{:.7};", p.lat, p.lon).as_bytes());
    }
    let samples_digest = format!("{:x}", samples.finalize());

    let source = match params.source {
        Some(src) => format!("{}|{}|{}", src.path.display(), src.modified_nanos, src.size),
        None => "inline".to_string(),
    };

    let mut hasher = Sha256::new();
    for part in [
        CACHE_FORMAT_VERSION.to_string(),
        source,
        format!("{}", params.distance_step),
        format!("{}", params.search_radius),
        params.amenity_filter.to_string(),
        params.scope.to_string(),
        samples_digest,
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix seconds.
    pub created_at: i64,
    pub features: Vec<Feature>,
}

impl CacheEntry {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            features,
        }
    }

    pub fn age(&self, now: i64) -> Duration {
        Duration::from_secs(now.saturating_sub(self.created_at).max(0) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn load(&self, key: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let path = self.entry_path(key);
        if !path.exists() {
            tracing::debug!("Cache: miss for {}", key);
            return None;
        }
        let entry = match read_entry(&path) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Cache: Ignoring unreadable entry {:?}: {:#}", path, err);
                return None;
            }
        };

        let age = entry.age(OffsetDateTime::now_utc().unix_timestamp());
        if age > self.ttl {
            tracing::debug!(
                "Cache: entry {} expired (age {}s > ttl {}s)",
                key,
                age.as_secs(),
                self.ttl.as_secs()
            );
            return None;
        }

        tracing::info!(
            "Cache: hit for {} ({} features, created {})",
            key,
            entry.features.len(),
            format_unix(entry.created_at).unwrap_or_else(|| entry.created_at.to_string())
        );
        Some(entry)
    }

    pub fn save(&self, key: &str, features: &[Feature]) {
        if !self.enabled {
            return;
        }
        let entry = CacheEntry::new(features.to_vec());
        match self.write_entry(key, &entry) {
            Ok(path) => tracing::info!(
                "Cache: stored {} features at {:?}",
                entry.features.len(),
                path
            ),
            Err(err) => tracing::warn!("Cache: Failed to store entry {}: {:#}", key, err),
        }
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cache: Failed to create directory {:?}", self.dir))?;
        let path = self.entry_path(key);
        let temp = NamedTempFile::new_in(&self.dir)
            .context("Cache: Failed to create temporary entry file")?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, entry)?;
            writer.flush()?;
        }
        temp.persist(&path)
            .with_context(|| format!("Cache: Failed to move entry into {:?}", path))?;
        Ok(path)
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn format_unix(secs: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()?
        .format(&Rfc3339)
        .ok()
}
