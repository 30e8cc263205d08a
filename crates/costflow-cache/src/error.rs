use thiserror::Error;

/// Result type local to costflow-cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value (de)serialization failed: {0}")]
    Serde(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serde(e.to_string())
    }
}
