//! Caller identities and the records exchanged during the OAuth flow.

use lfs_core::RepositoryName;
use serde::{Deserialize, Serialize};

/// Identity of a CI workload, taken from a verified GitHub Actions token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub sub: String,
    pub repository: RepositoryName,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub actor: String,
}

/// A signed-in user, stored server-side under a session id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub provider: String,
    /// Repository the session was issued for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

/// The subset of GitHub's `/user` payload the proxy uses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUserInfo {
    pub id: i64,
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Pre-callback record bound to an OAuth `state` value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub repository: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
}

/// The authenticated caller of an LFS request.
#[derive(Clone, Debug)]
pub enum Identity {
    Workload(WorkloadIdentity),
    User { session_id: String, info: UserInfo },
}

impl Identity {
    pub fn subject(&self) -> &str {
        match self {
            Self::Workload(w) => &w.sub,
            Self::User { info, .. } => &info.sub,
        }
    }

    /// `oidc` or `session`, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Workload(_) => "oidc",
            Self::User { .. } => "session",
        }
    }

    /// Whether this identity may act on `repo`.
    ///
    /// Workloads are bound to the repository claim of their token. Sessions
    /// are bound to the repository they were issued for, when there is one.
    pub fn permits(&self, repo: &RepositoryName) -> bool {
        match self {
            Self::Workload(w) => &w.repository == repo,
            Self::User { info, .. } => match &info.repository {
                Some(bound) => RepositoryName::parse(bound).is_ok_and(|b| &b == repo),
                None => true,
            },
        }
    }
}
