//! Caller authentication for the Git LFS proxy.
//!
//! Two identity sources feed the LFS middleware:
//! - GitHub Actions OIDC tokens, verified against the issuer's JWKS
//!   ([`JwksFetcher`], [`JwtVerifier`], [`GitHubActionsProvider`])
//! - OAuth sessions created after a GitHub sign-in
//!   ([`GitHubOAuthClient`], [`OAuthStateStore`], [`SessionStore`])

pub mod error;
mod http;
pub mod identity;
pub mod jwks;
pub mod jwt;
pub mod oauth;
pub mod oidc;
pub mod session;
pub mod state;

pub use error::{AuthError, AuthResult};
pub use identity::{GitHubUserInfo, Identity, OAuthState, UserInfo, WorkloadIdentity};
pub use jwks::{Jwk, JwkSet, JwksFetcher};
pub use jwt::{Claims, Expectations, JwtVerifier};
pub use oauth::{GitHubOAuthClient, TokenResponse};
pub use oidc::{GITHUB_ACTIONS_PROVIDER, GitHubActionsProvider};
pub use session::SessionStore;
pub use state::OAuthStateStore;

use lfs_cache::KvCache;
use lfs_core::config::AppConfig;
use std::sync::Arc;

/// Build the GitHub Actions provider described by `config`.
pub fn github_actions_from_config(
    config: &AppConfig,
    cache: Arc<dyn KvCache>,
) -> AuthResult<GitHubActionsProvider> {
    let jwks = Arc::new(JwksFetcher::new(cache, config.ttl.jwks())?);
    let verifier = JwtVerifier::new(jwks, config.github_actions.leeway_secs());
    Ok(GitHubActionsProvider::new(verifier, &config.github_actions))
}

/// Build the OAuth client when OAuth is configured.
pub fn github_oauth_from_config(config: &AppConfig) -> AuthResult<Option<GitHubOAuthClient>> {
    match (&config.github_oauth, config.oauth_redirect_uri()) {
        (Some(oauth), Some(redirect_uri)) => Ok(Some(GitHubOAuthClient::new(oauth, redirect_uri)?)),
        _ => Ok(None),
    }
}
