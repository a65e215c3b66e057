//! Error types for credential verification and the OAuth flow.

use lfs_cache::CacheError;
use thiserror::Error;

/// Authentication errors.
///
/// Messages never include token material or client secrets.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential is not a JWT at all.
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("key id not found in JWKS: {0}")]
    KeyIdNotFound(String),

    #[error("failed to fetch JWKS: {0}")]
    JwksFetchFailed(String),

    #[error("JWK exponent out of range")]
    ExponentOutOfRange,

    #[error("invalid JWK: {0}")]
    InvalidJwk(String),

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid issuer")]
    InvalidIssuer,

    #[error("invalid audience")]
    InvalidAudience,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("empty access token")]
    EmptyAccessToken,

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("session not found")]
    SessionNotFound,

    #[error("OAuth state not found or expired")]
    StateNotFound,

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// Whether the credential was simply not meant for this verifier, so
    /// the caller may try a different credential kind.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::InvalidIssuer)
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::MissingKeyId | Self::KeyIdNotFound(_) | Self::InvalidJwk(_) => "unknown_key",
            Self::ExponentOutOfRange => "unknown_key",
            Self::JwksFetchFailed(_) => "jwks_unavailable",
            Self::ExpiredToken => "expired",
            Self::InvalidToken(_) => "invalid_token",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::SessionNotFound => "unknown_session",
            Self::OAuth(_) | Self::EmptyAccessToken | Self::StateNotFound => "oauth",
            Self::Upstream(_) => "upstream",
            Self::Cache(_) | Self::Serialization(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL: OAuth query strings may carry codes.
        Self::Upstream(err.without_url().to_string())
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
