use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenerError {
    /// Missing indicator or macro data. Degrades to zero-contribution or a
    /// default regime; only fatal when an entire pass has nothing to score.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Unparseable or schema-invalid reply from the reasoning service.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Timeout, rate limit or transport error; retried before turning
    /// into a permanent per-instrument failure.
    #[error("transient service failure: {0}")]
    TransientServiceFailure(String),

    /// Invalid weights, thresholds or concurrency settings. Fatal at
    /// startup, never raised during a pass.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

pub type ScreenerResult<T> = Result<T, ScreenerError>;

/// Failure modes of a single reasoning-service call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceFailure {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(String),
}
