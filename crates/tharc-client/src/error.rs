//! Client error types.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP 412: the remote's anti-crawler throttle.
    #[error("throttled by remote (HTTP 412)")]
    Throttled,

    /// The response envelope carried a non-zero code.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A response decoded but did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    Parse(String),

    /// WBI key discovery failed; nothing signed can be fetched.
    #[error("WBI key discovery failed: {0}")]
    KeyDiscovery(String),
}

impl ClientError {
    /// Whether the request loop may retry after this error. Key discovery
    /// failures happen before the first attempt and abort the call.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::KeyDiscovery(_))
    }
}
