//! Error types for the watch pipeline

use std::time::Duration;
use thiserror::Error;

/// Errors raised anywhere between the stream and the publisher
#[derive(Debug, Error)]
pub enum WatchError {
    /// A frame, post, mention, or knowledge-base response had the wrong shape
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The aggregator was handed no post at all
    #[error("No input to analyze")]
    NoInput,

    /// Remote API answered with a non-success status
    #[error("API error from {provider} ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// Remote API asked us to slow down
    #[error("Rate limit exceeded for {provider}, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Duration,
    },

    /// The streaming connection failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// The server ended a streaming session; the supervisor restarts it
    #[error("Session terminated: {0}")]
    SessionTerminated(String),

    /// The supervisor ran out of reconnect attempts
    #[error("Retry budget exhausted after {tries} tries")]
    RetryBudgetExhausted { tries: u32 },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Socket or file error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;

impl WatchError {
    /// Whether a publish attempt that failed this way is worth repeating
    ///
    /// The status list matches the platform's transient and auth-flap codes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 400 | 401 | 500 | 502 | 503 | 504),
            Self::RateLimited { .. } | Self::NetworkError(_) => true,
            _ => false,
        }
    }
}

impl From<tickerwatch_utils::EnvError> for WatchError {
    fn from(err: tickerwatch_utils::EnvError) -> Self {
        WatchError::ConfigError(err.to_string())
    }
}
