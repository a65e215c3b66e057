//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid oid: {0}")]
    InvalidOid(String),

    #[error("unsupported hash algorithm: {0}")]
    InvalidHashAlgo(String),

    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    #[error("invalid size: {0}")]
    InvalidSize(i64),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
