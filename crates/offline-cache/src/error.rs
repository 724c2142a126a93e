/// Errors surfaced by the cache store and the worker lifecycle.
///
/// Strategies never return these to the page; they are converted into
/// fallback responses at the strategy boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Install failed while caching {asset}: {reason}")]
    Install { asset: String, reason: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid namespace name: {0:?}")]
    InvalidNamespace(String),

    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry { path: String, reason: String },

    #[error("Worker is in state {0} and cannot {1}")]
    InvalidState(String, &'static str),
}

/// Failures of the transport underneath the strategies.
///
/// Only transport failures count as "network unavailable". An HTTP error
/// status is a valid response and is passed through by the strategies.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
