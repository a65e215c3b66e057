//! Cache error types.

use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is absent or expired. Not a transport failure.
    #[error("cache miss")]
    Miss,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache operation timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether this is a miss rather than a backend failure.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
