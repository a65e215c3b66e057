//! GitHub OAuth bootstrap: issues session tokens to human users.

use crate::auth::get_trace_id;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, Request, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use lfs_auth::{GitHubOAuthClient, OAuthState, UserInfo};
use lfs_core::RepositoryName;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest accepted `shell` hint.
const MAX_SHELL_LEN: usize = 32;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub repository: Option<String>,
    pub shell: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Issued session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_in: u64,
    pub repository: String,
    pub lfs_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
}

fn oauth_client(state: &AppState) -> ApiResult<Arc<GitHubOAuthClient>> {
    state
        .oauth
        .clone()
        .ok_or_else(|| ApiError::NotFound("GitHub OAuth is not configured".to_string()))
}

/// Shell hints are names like `bash` or `pwsh`.
fn validate_shell(shell: Option<String>) -> ApiResult<Option<String>> {
    match shell {
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if s.len() <= MAX_SHELL_LEN && s.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Ok(Some(s))
        }
        Some(_) => Err(ApiError::BadRequest("invalid shell".to_string())),
        None => Ok(None),
    }
}

/// GET /auth/github/login?repository=owner/name[&shell=...]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> ApiResult<Response> {
    let client = oauth_client(&state)?;

    let repository = query
        .repository
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("repository is required".to_string()))
        .and_then(|r| RepositoryName::parse(r).map_err(ApiError::from))?;
    let shell = validate_shell(query.shell)?;

    if !state.allowlist.is_allowed(&repository).await? {
        return Err(ApiError::Forbidden(
            "repository is not served by this server".to_string(),
        ));
    }

    let oauth_state = state
        .oauth_states
        .issue(&OAuthState {
            repository: repository.full_name(),
            redirect_uri: client.redirect_uri().to_string(),
            shell,
        })
        .await?;

    let scopes = state
        .config
        .github_oauth
        .as_ref()
        .map(|c| c.scopes.clone())
        .unwrap_or_default();
    let location = client.authorization_url(&oauth_state, &scopes);
    let location = HeaderValue::try_from(location)
        .map_err(|e| ApiError::Internal(format!("invalid authorize URL: {e}")))?;

    tracing::info!(repository = %repository, "Starting GitHub OAuth login");
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

/// GET /auth/github/callback?code&state
pub async fn callback(State(state): State<AppState>, req: Request) -> ApiResult<Json<SessionResponse>> {
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let client = oauth_client(&state)?;
    let Query(query) = Query::<CallbackQuery>::try_from_uri(req.uri())
        .map_err(|e| ApiError::BadRequest(format!("invalid callback query: {e}")))?;

    if let Some(error) = query.error {
        tracing::info!(trace_id = %trace_id, error = %error, "GitHub denied authorization");
        return Err(ApiError::Unauthorized(format!(
            "authorization was denied: {error}"
        )));
    }
    let (Some(code), Some(state_value)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("code and state are required".to_string()));
    };

    let pending = state.oauth_states.consume(&state_value).await?;
    let repository = RepositoryName::parse(&pending.repository)?;

    let token = client.exchange_code(&code, &pending.redirect_uri).await?;
    let user = client.user_info(&token.access_token).await?;
    if !client
        .can_access_repository(&token.access_token, &repository)
        .await?
    {
        tracing::info!(
            trace_id = %trace_id,
            login = %user.login,
            repository = %repository,
            "User cannot access repository"
        );
        return Err(ApiError::Forbidden(
            "you do not have access to this repository".to_string(),
        ));
    }

    let info = UserInfo {
        sub: user.id.to_string(),
        email: user.email.unwrap_or_default(),
        name: user.login.clone(),
        provider: "github".to_string(),
        repository: Some(repository.full_name()),
        git_ref: None,
    };
    let ttl = state.sessions.default_ttl();
    let session_id = state.sessions.create_session(&info, ttl).await?;

    tracing::info!(
        trace_id = %trace_id,
        login = %user.login,
        repository = %repository,
        "Issued OAuth session"
    );
    Ok(Json(SessionResponse {
        token: session_id,
        expires_in: ttl.as_secs(),
        repository: repository.full_name(),
        lfs_url: state.signer.lfs_url(&repository),
        shell: pending.shell,
    }))
}
