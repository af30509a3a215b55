/// Run-level failures. Everything else degrades the result instead of
/// aborting (see `pipeline`).
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Track contains no points")]
    EmptyTrack,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker failure: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, EnrichError>;

/// Failure classes reported by a geodata backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeodataError {
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport retries exhausted: {0}")]
    RetriesExhausted(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("{0}")]
    Other(String),
}

impl GeodataError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GeodataError::GatewayTimeout(_)
                | GeodataError::RateLimited(_)
                | GeodataError::RetriesExhausted(_)
        )
    }
}
