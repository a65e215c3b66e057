//! Outbound HTTP helpers shared by the JWKS fetcher and the OAuth client.

use crate::error::{AuthError, AuthResult};
use std::time::Duration;

/// Timeout for every call to an identity provider.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest response body read from an identity provider.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub(crate) fn build_client() -> AuthResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("lfs-proxy/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AuthError::from)
}

/// Read a response body, failing once it exceeds `limit` bytes.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> AuthResult<Vec<u8>> {
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(AuthError::Upstream(format!(
            "response body exceeds {limit} bytes"
        )));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(AuthError::Upstream(format!(
                "response body exceeds {limit} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
