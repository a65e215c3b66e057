//! GitHub Actions OIDC: verified tokens become workload identities.

use crate::error::{AuthError, AuthResult};
use crate::identity::WorkloadIdentity;
use crate::jwt::{Claims, Expectations, JwtVerifier};
use lfs_core::RepositoryName;
use lfs_core::config::GitHubActionsConfig;
use serde_json::Value;

/// Provider name used in cache keys and logs.
pub const GITHUB_ACTIONS_PROVIDER: &str = "github-actions";

pub struct GitHubActionsProvider {
    verifier: JwtVerifier,
    issuer: String,
    jwks_url: String,
    audience: String,
}

impl GitHubActionsProvider {
    pub fn new(verifier: JwtVerifier, config: &GitHubActionsConfig) -> Self {
        Self {
            verifier,
            issuer: config.issuer.clone(),
            jwks_url: config.jwks_url(),
            audience: config.audience.clone(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify a GitHub Actions token and extract the workload identity.
    ///
    /// `sub`, `repository`, `ref` and `actor` are all required.
    pub async fn verify(&self, token: &str) -> AuthResult<WorkloadIdentity> {
        let claims = self
            .verifier
            .verify(
                token,
                Expectations {
                    provider: GITHUB_ACTIONS_PROVIDER,
                    jwks_url: &self.jwks_url,
                    issuer: &self.issuer,
                    audience: &self.audience,
                },
            )
            .await?;

        let repository = RepositoryName::parse(required(&claims, "repository")?)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(WorkloadIdentity {
            sub: required(&claims, "sub")?.to_string(),
            repository,
            git_ref: required(&claims, "ref")?.to_string(),
            actor: required(&claims, "actor")?.to_string(),
        })
    }
}

fn required<'c>(claims: &'c Claims, name: &str) -> AuthResult<&'c str> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::InvalidToken(format!("missing claim {name}")))
}
