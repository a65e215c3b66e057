//! GitHub OAuth: code exchange, user lookup and repository access probes.

use crate::error::{AuthError, AuthResult};
use crate::http::{MAX_BODY_BYTES, build_client, read_capped};
use crate::identity::GitHubUserInfo;
use lfs_core::RepositoryName;
use lfs_core::config::{GitHubOAuthConfig, SecretString};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

const GITHUB_JSON: &str = "application/vnd.github+json";

/// Access token returned by the token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// GitHub answers 200 with an `error` field on failed exchanges.
#[derive(Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct GitHubOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    authorize_url: Url,
    token_url: String,
    api_url: String,
}

impl std::fmt::Debug for GitHubOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubOAuthClient")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

impl GitHubOAuthClient {
    pub fn new(config: &GitHubOAuthConfig, redirect_uri: impl Into<String>) -> AuthResult<Self> {
        let authorize_url = Url::parse(&config.authorize_url)
            .map_err(|e| AuthError::OAuth(format!("invalid authorize_url: {e}")))?;
        Ok(Self {
            http: build_client()?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: redirect_uri.into(),
            authorize_url,
            token_url: config.token_url.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// GitHub authorize URL for `state`, requesting the space-joined `scopes`.
    pub fn authorization_url(&self, state: &str, scopes: &[String]) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &scopes.join(" "));
        url.into()
    }

    /// Exchange an authorization code for an access token.
    ///
    /// `redirect_uri` must be the one sent on the authorize request that
    /// issued `code`; GitHub rejects the exchange otherwise.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AuthResult<TokenResponse> {
        if code.is_empty() {
            return Err(AuthError::OAuth("missing authorization code".to_string()));
        }

        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = read_capped(response, MAX_BODY_BYTES).await?;
        let raw: RawTokenResponse = serde_json::from_slice(&body).map_err(|_| {
            AuthError::OAuth(format!("token endpoint returned {status} with an unreadable body"))
        })?;

        if raw.error.is_some() || raw.error_description.is_some() {
            let message = raw
                .error_description
                .or(raw.error)
                .unwrap_or_default();
            return Err(AuthError::OAuth(message));
        }
        if !status.is_success() {
            return Err(AuthError::OAuth(format!("token endpoint returned {status}")));
        }

        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::EmptyAccessToken)?;

        Ok(TokenResponse {
            access_token,
            token_type: raw.token_type.unwrap_or_default(),
            scope: raw.scope.unwrap_or_default(),
        })
    }

    /// Fetch the user that owns `access_token`.
    #[instrument(skip_all)]
    pub async fn user_info(&self, access_token: &str) -> AuthResult<GitHubUserInfo> {
        if access_token.is_empty() {
            return Err(AuthError::EmptyAccessToken);
        }

        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .bearer_auth(access_token)
            .header(ACCEPT, GITHUB_JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Upstream(format!("user endpoint returned {status}")));
        }
        let body = read_capped(response, MAX_BODY_BYTES).await?;
        let user: GitHubUserInfo = serde_json::from_slice(&body)?;
        debug!(login = %user.login, "Resolved GitHub user");
        Ok(user)
    }

    /// Whether the token's user can see `repo`.
    #[instrument(skip(self, access_token), fields(repository = %repo))]
    pub async fn can_access_repository(
        &self,
        access_token: &str,
        repo: &RepositoryName,
    ) -> AuthResult<bool> {
        if access_token.is_empty() {
            return Err(AuthError::EmptyAccessToken);
        }

        let url = format!(
            "{}/repos/{}/{}",
            self.api_url,
            utf8_percent_encode(repo.owner(), NON_ALPHANUMERIC),
            utf8_percent_encode(repo.name(), NON_ALPHANUMERIC),
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, GITHUB_JSON)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            other => Err(AuthError::Upstream(format!(
                "repository probe returned {other}"
            ))),
        }
    }
}
