//! Cache key generators and default TTLs.
//!
//! Key prefixes are shared with other deployments of the service reading the
//! same cache, so they must not change.

use crate::{Oid, RepositoryName};
use std::time::Duration;

pub const METADATA_TTL: Duration = Duration::from_secs(30 * 60);
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const ALLOWLIST_TTL: Duration = Duration::from_secs(5 * 60);
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);
pub const JWKS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Minimum spacing between refetches of a cached key set.
pub const JWKS_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// `lfs:meta:<oid>`
pub fn object_meta_key(oid: &Oid) -> String {
    format!("lfs:meta:{oid}")
}

/// `lfs:session:<sid>`
pub fn session_key(session_id: &str) -> String {
    format!("lfs:session:{session_id}")
}

/// `lfs:oidc:github:repo:<owner>/<name>`
pub fn github_repo_key(repo: &RepositoryName) -> String {
    format!("lfs:oidc:github:repo:{}/{}", repo.owner(), repo.name())
}

/// `lfs:oidc:state:<state>`
pub fn oauth_state_key(state: &str) -> String {
    format!("lfs:oidc:state:{state}")
}

/// `lfs:oidc:jwks:<provider>`
pub fn jwks_key(provider: &str) -> String {
    format!("lfs:oidc:jwks:{provider}")
}

/// `lfs:oidc:jwks:<provider>:refetch`, present while refetches are held off.
pub fn jwks_refetch_key(provider: &str) -> String {
    format!("lfs:oidc:jwks:{provider}:refetch")
}

/// A zero TTL selects the caller's default.
pub fn ttl_or(ttl: Duration, default: Duration) -> Duration {
    if ttl.is_zero() { default } else { ttl }
}
