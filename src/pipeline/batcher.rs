//! Batched querying with retry, backoff and pacing.

use rand::Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use crate::error::{EnrichError, GeodataError};
use crate::features::FeatureSet;
use crate::geomath::LatLon;
use crate::overpass::{GeodataClient, QueryResult, QuerySpec, build_query};

/// Upper bound of the random jitter added to each backoff delay.
const MAX_JITTER: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub batch_sleep: Duration,
    pub client_timeout: Duration,
    pub concurrency: usize,
}

#[derive(Debug)]
pub enum BatchOutcome {
    Completed {
        result: QueryResult,
        retries_used: u32,
    },
    Failed {
        error: GeodataError,
        retries_used: u32,
    },
    Cancelled,
}

/// Aggregate of all batch outcomes folded in batch order.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub features: FeatureSet,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub batches_failed: usize,
    pub retries_used: u32,
    pub cancelled: bool,
}

impl FetchSummary {
    fn new(batches_total: usize) -> Self {
        Self {
            batches_total,
            ..Self::default()
        }
    }

    fn absorb(mut self, index: usize, outcome: BatchOutcome, nodes_only: bool) -> Self {
        match outcome {
            BatchOutcome::Completed {
                result,
                retries_used,
            } => {
                tracing::info!(
                    "Overpass: batch {}/{} returned {} nodes, {} ways",
                    index + 1,
                    self.batches_total,
                    result.nodes.len(),
                    result.ways.len()
                );
                self.features = self.features.merge(result, nodes_only);
                self.batches_completed += 1;
                self.retries_used += retries_used;
            }
            BatchOutcome::Failed {
                error,
                retries_used,
            } => {
                tracing::warn!(
                    "Overpass: dropping batch {}/{} after {} retries: {}",
                    index + 1,
                    self.batches_total,
                    retries_used,
                    error
                );
                self.batches_failed += 1;
                self.retries_used += retries_used;
            }
            BatchOutcome::Cancelled => self.cancelled = true,
        }
        self
    }
}

/// Delay before retry number `attempt` (0-based): `base * 2^attempt` plus up
/// to 30% jitter.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let delay = base.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
    let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER);
    Duration::try_from_secs_f64(delay * (1.0 + jitter)).unwrap_or(Duration::MAX)
}

/// Spaces request starts at least `spacing` apart across worker threads.
pub struct DispatchLimiter {
    next_dispatch: Mutex<Option<Instant>>,
    spacing: Duration,
}

impl DispatchLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            next_dispatch: Mutex::new(None),
            spacing,
        }
    }

    /// Blocks until this caller's slot. Returns false if cancelled.
    pub fn wait_for_slot(&self, cancel: &CancelToken) -> bool {
        let wait = {
            let mut next = match self.next_dispatch.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let dispatch_at = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(dispatch_at + self.spacing);
            dispatch_at - now
        };
        cancel.sleep(wait)
    }
}

/// Runs one batch query, retrying transient failures.
pub fn fetch_with_retry(
    client: &dyn GeodataClient,
    query: &str,
    policy: &BatchPolicy,
    limiter: Option<&DispatchLimiter>,
    cancel: &CancelToken,
) -> BatchOutcome {
    let mut retries_used = 0;
    loop {
        if cancel.is_cancelled() {
            return BatchOutcome::Cancelled;
        }
        if let Some(limiter) = limiter
            && !limiter.wait_for_slot(cancel)
        {
            return BatchOutcome::Cancelled;
        }

        let error = match client.query(query, policy.client_timeout) {
            Ok(result) => {
                return BatchOutcome::Completed {
                    result,
                    retries_used,
                };
            }
            Err(error) => error,
        };

        if !error.is_retryable() || retries_used >= policy.retries {
            return BatchOutcome::Failed {
                error,
                retries_used,
            };
        }

        let delay = backoff_delay(policy.retry_backoff, retries_used);
        tracing::info!(
            "Overpass: {} - retry {}/{} in {:.1}s",
            error,
            retries_used + 1,
            policy.retries,
            delay.as_secs_f64()
        );
        if !cancel.sleep(delay) {
            return BatchOutcome::Cancelled;
        }
        retries_used += 1;
    }
}

/// Queries every batch of `samples` and folds the results.
///
/// A failed batch only reduces completeness. Cancellation stops further
/// batches and returns what was gathered so far.
pub fn fetch_features(
    client: &dyn GeodataClient,
    samples: &[LatLon],
    spec: &QuerySpec,
    policy: &BatchPolicy,
    cancel: &CancelToken,
) -> Result<FetchSummary, EnrichError> {
    if samples.is_empty() {
        return Ok(FetchSummary::new(0));
    }
    let batch_size = policy.batch_size.max(1);
    let queries: Vec<String> = samples
        .chunks(batch_size)
        .map(|batch| build_query(batch, spec))
        .collect();
    tracing::info!(
        "Pipeline: {} sample points in {} batches (batch size {})",
        samples.len(),
        queries.len(),
        batch_size
    );

    if policy.concurrency > 1 && queries.len() > 1 {
        fetch_parallel(client, &queries, spec, policy, cancel)
    } else {
        Ok(fetch_sequential(client, &queries, spec, policy, cancel))
    }
}

fn fetch_sequential(
    client: &dyn GeodataClient,
    queries: &[String],
    spec: &QuerySpec,
    policy: &BatchPolicy,
    cancel: &CancelToken,
) -> FetchSummary {
    let total = queries.len();
    queries
        .iter()
        .enumerate()
        .fold(FetchSummary::new(total), |summary, (index, query)| {
            if summary.cancelled {
                return summary;
            }
            let outcome = fetch_with_retry(client, query, policy, None, cancel);
            let succeeded = matches!(outcome, BatchOutcome::Completed { .. });
            let mut summary = summary.absorb(index, outcome, spec.nodes_only);
            if succeeded && index + 1 < total && !cancel.sleep(policy.batch_sleep) {
                summary.cancelled = true;
            }
            summary
        })
}

fn fetch_parallel(
    client: &dyn GeodataClient,
    queries: &[String],
    spec: &QuerySpec,
    policy: &BatchPolicy,
    cancel: &CancelToken,
) -> Result<FetchSummary, EnrichError> {
    let total = queries.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(policy.concurrency)
        .build()
        .map_err(|e| EnrichError::Worker(format!("Failed to build batch pool: {e}")))?;
    let limiter = DispatchLimiter::new(policy.batch_sleep);
    let (tx, rx) = crossbeam_channel::bounded::<(usize, BatchOutcome)>(total);

    std::thread::scope(|scope| {
        // Single aggregator: folds outcomes strictly in batch order so the
        // result matches a sequential run.
        let aggregator = scope.spawn(move || {
            let mut summary = FetchSummary::new(total);
            let mut pending = BTreeMap::new();
            let mut next = 0;
            for (index, outcome) in rx {
                pending.insert(index, outcome);
                while let Some(outcome) = pending.remove(&next) {
                    summary = summary.absorb(next, outcome, spec.nodes_only);
                    next += 1;
                }
            }
            for (index, outcome) in pending {
                summary = summary.absorb(index, outcome, spec.nodes_only);
            }
            summary
        });

        pool.install(|| {
            queries
                .par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (index, query)| {
                    let outcome = fetch_with_retry(client, query, policy, Some(&limiter), cancel);
                    if tx.send((index, outcome)).is_err() {
                        tracing::debug!("Pipeline: aggregator gone, dropping batch {}", index);
                    }
                });
        });

        aggregator.join().map_err(|panic_payload| {
            let panic_msg = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            EnrichError::Worker(format!("Aggregator thread panicked: {panic_msg}"))
        })
    })
}
