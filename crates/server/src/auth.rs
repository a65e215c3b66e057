//! Request context and LFS authentication middleware.

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_auth_failure;
use crate::protocol::require_lfs_media_types;
use crate::signing::{ProxyOperation, SignatureError};
use crate::state::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::http::Method;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use lfs_auth::{AuthError, Identity};
use lfs_core::{Oid, RepositoryName};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and reduced to
    /// printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the caller of an LFS route proved access.
#[derive(Clone, Debug)]
pub enum Principal {
    /// A Bearer credential: OIDC token or session.
    Identity(Identity),
    /// A signed proxy URL minted by a previous batch call.
    SignedUrl(ProxyOperation),
}

/// Authenticated request extension for LFS routes.
#[derive(Clone, Debug)]
pub struct LfsContext {
    /// Repository from the URL path, `.git` stripped.
    pub repository: RepositoryName,
    pub principal: Principal,
}

impl LfsContext {
    /// Label for logs.
    pub fn caller_kind(&self) -> &'static str {
        match &self.principal {
            Principal::Identity(identity) => identity.kind(),
            Principal::SignedUrl(_) => "signed_url",
        }
    }
}

/// Path parameters shared by all LFS routes.
#[derive(Debug, Deserialize)]
pub struct LfsPath {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub oid: Option<String>,
}

/// Query parameters of a signed proxy URL.
#[derive(Debug, Default, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<String>,
    pub signature: Option<String>,
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|token| !token.is_empty())
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Outermost middleware: assigns the trace ID and runs the request within
/// a span carrying it.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    next.run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await
}

/// Which signed operation a proxy request corresponds to. Batch requests
/// never accept signatures.
fn proxy_operation(method: &Method, uri_path: &str, path: &LfsPath) -> Option<ProxyOperation> {
    match (method, path.oid.as_deref()) {
        (&Method::PUT, Some(_)) => Some(ProxyOperation::Upload),
        (&Method::GET, Some(_)) => Some(ProxyOperation::Download),
        (&Method::POST, None) if uri_path.ends_with("/objects/verify") => {
            Some(ProxyOperation::Verify)
        }
        _ => None,
    }
}

/// Authentication for `/{owner}/{name}/info/lfs/...`.
///
/// In order: media types on JSON endpoints, signed URL or Bearer
/// credential, allowlist membership, and the credential's own repository
/// binding. Every authentication failure is a 401 with `LFS-Authenticate`.
pub async fn lfs_auth_middleware(
    State(state): State<AppState>,
    Path(path): Path<LfsPath>,
    Query(query): Query<SignedQuery>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if req.method() == Method::POST {
        require_lfs_media_types(req.headers())?;
    }

    let repository = RepositoryName::from_path(&path.owner, &path.name)?;

    let signed_op = proxy_operation(req.method(), req.uri().path(), &path)
        .filter(|_| query.signature.is_some());
    let principal = match signed_op {
        Some(op) => {
            check_signature(&state, op, &repository, &path, &query)?;
            Principal::SignedUrl(op)
        }
        None => {
            let token = extract_bearer_token(&req).ok_or_else(|| {
                record_auth_failure("missing_credentials");
                ApiError::Unauthorized("authentication required".to_string())
            })?;
            Principal::Identity(authenticate(&state, token).await?)
        }
    };

    if !state.allowlist.is_allowed(&repository).await? {
        record_auth_failure("repository_not_allowed");
        tracing::info!(repository = %repository, "Repository is not allowlisted");
        return Err(ApiError::Unauthorized(
            "repository is not served by this server".to_string(),
        ));
    }

    if let Principal::Identity(identity) = &principal
        && !identity.permits(&repository)
    {
        record_auth_failure("repository_mismatch");
        tracing::info!(
            repository = %repository,
            caller = identity.kind(),
            subject = identity.subject(),
            "Credential is bound to another repository"
        );
        return Err(ApiError::Unauthorized(
            "credential does not grant access to this repository".to_string(),
        ));
    }

    let context = LfsContext {
        repository,
        principal,
    };
    tracing::debug!(
        repository = %context.repository,
        caller = context.caller_kind(),
        "LFS request authenticated"
    );
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

fn check_signature(
    state: &AppState,
    op: ProxyOperation,
    repository: &RepositoryName,
    path: &LfsPath,
    query: &SignedQuery,
) -> ApiResult<()> {
    let reject = |reason: &str, message: &str| {
        record_auth_failure(reason);
        ApiError::Unauthorized(message.to_string())
    };

    let expires: i64 = query
        .expires
        .as_deref()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| reject("invalid_signature", "proxy URL is missing its expiry"))?;
    let signature = query.signature.as_deref().unwrap_or_default();
    let oid = match &path.oid {
        Some(raw) => Some(Oid::parse(raw)?),
        None => None,
    };

    state
        .signer
        .verify(
            op,
            repository,
            oid.as_ref(),
            expires,
            signature,
            OffsetDateTime::now_utc(),
        )
        .map_err(|e| match e {
            SignatureError::Expired => reject("expired_url", &e.to_string()),
            SignatureError::Invalid => reject("invalid_signature", &e.to_string()),
        })
}

/// Resolve a Bearer credential: a GitHub Actions token first, then a
/// session id when the token is not an Actions JWT at all.
async fn authenticate(state: &AppState, token: &str) -> ApiResult<Identity> {
    match state.oidc.verify(token).await {
        Ok(workload) => Ok(Identity::Workload(workload)),
        Err(e) if e.is_shape_mismatch() => match state.sessions.get_session(token).await {
            Ok(info) => Ok(Identity::User {
                session_id: token.to_string(),
                info,
            }),
            Err(session_err) => Err(auth_failure(session_err)),
        },
        Err(e) => Err(auth_failure(e)),
    }
}

fn auth_failure(err: AuthError) -> ApiError {
    record_auth_failure(err.reason());
    tracing::info!(reason = err.reason(), error = %err, "Credential rejected");
    match err {
        // A credential that cannot be checked is still a 401.
        AuthError::Cache(_) | AuthError::Serialization(_) => {
            ApiError::Unauthorized("credential could not be verified".to_string())
        }
        other => ApiError::Auth(other),
    }
}

/// Require the authenticated LFS context from request extensions.
pub fn require_lfs_context(req: &Request) -> ApiResult<&LfsContext> {
    req.extensions()
        .get::<LfsContext>()
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
