//! Proxy transfer handlers: object bytes stream through this server to and
//! from the object store.

use crate::auth::{LfsPath, get_trace_id, require_lfs_context};
use crate::error::{ApiError, ApiResult, MSG_OBJECT_NOT_FOUND, MSG_SIZE_MISMATCH};
use crate::metrics::{DOWNLOAD_BYTES, UPLOAD_BYTES, UPLOAD_DURATION, record_upload_error};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use lfs_core::{Oid, RepositoryName, StorageKey};
use lfs_metadata::AccessPolicyRepo;
use lfs_storage::{ObjectStore, ObjectStoreExt, StorageError};
use std::time::Instant;

const OCTET_STREAM: &str = "application/octet-stream";

/// Whether `repo` may touch `oid`: no policy, or a policy naming `repo`.
/// With `require_policy`, a missing policy is also a denial.
async fn check_policy(
    state: &AppState,
    oid: &Oid,
    repo: &RepositoryName,
    require_policy: bool,
) -> ApiResult<()> {
    let allowed = match state.metadata.find_access_policy(oid).await? {
        Some(policy) => policy.allows(repo),
        None => !require_policy,
    };
    if !allowed {
        tracing::info!(oid = %oid, repository = %repo, "Transfer denied by access policy");
        return Err(ApiError::Forbidden(
            "access to this object is denied".to_string(),
        ));
    }
    Ok(())
}

fn declared_length(req: &Request) -> ApiResult<u64> {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest("Content-Length header is required".to_string()))
}

/// PUT /{owner}/{name}/info/lfs/objects/{oid}
///
/// Streams the request body into storage. The object must have been
/// announced by a batch upload; it stays pending until verify.
pub async fn upload_object(
    State(state): State<AppState>,
    Path(path): Path<LfsPath>,
    req: Request,
) -> ApiResult<StatusCode> {
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let repo = require_lfs_context(&req)?.repository.clone();
    let oid = Oid::parse(path.oid.as_deref().unwrap_or_default())?;
    let declared = declared_length(&req)?;

    let row = state
        .objects
        .find(&oid)
        .await?
        .ok_or_else(|| ApiError::NotFound(MSG_OBJECT_NOT_FOUND.to_string()))?;
    if row.uploaded {
        tracing::debug!(trace_id = %trace_id, oid = %oid, "Object already uploaded; skipping write");
        return Ok(StatusCode::OK);
    }
    if declared != row.size_bytes() {
        record_upload_error("size_mismatch");
        return Err(ApiError::Unprocessable(MSG_SIZE_MISMATCH.to_string()));
    }
    check_policy(&state, &oid, &repo, false).await?;

    let key = StorageKey::derive(row.hash_algo()?, &oid);
    let body = req
        .into_body()
        .into_data_stream()
        .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))
        .boxed();

    let start = Instant::now();
    let written = match tokio::time::timeout(
        state.config.server.upload_timeout(),
        state.storage.stream_put(&key, body, declared, Some(oid.digest())),
    )
    .await
    {
        Ok(Ok(written)) => written,
        Ok(Err(e)) => {
            record_upload_error(if e.is_integrity_failure() {
                "integrity"
            } else {
                "storage"
            });
            tracing::warn!(trace_id = %trace_id, oid = %oid, error = %e, "Proxy upload failed");
            return Err(e.into());
        }
        Err(_) => {
            record_upload_error("timeout");
            tracing::warn!(trace_id = %trace_id, oid = %oid, "Proxy upload timed out");
            return Err(ApiError::RequestTimeout);
        }
    };

    UPLOAD_DURATION.observe(start.elapsed().as_secs_f64());
    UPLOAD_BYTES.inc_by(written);
    tracing::info!(
        trace_id = %trace_id,
        oid = %oid,
        repository = %repo,
        bytes = written,
        "Object stored"
    );
    Ok(StatusCode::OK)
}

/// GET /{owner}/{name}/info/lfs/objects/{oid}
pub async fn download_object(
    State(state): State<AppState>,
    Path(path): Path<LfsPath>,
    req: Request,
) -> ApiResult<Response> {
    let repo = require_lfs_context(&req)?.repository.clone();
    let oid = Oid::parse(path.oid.as_deref().unwrap_or_default())?;

    check_policy(&state, &oid, &repo, true).await?;

    let row = state
        .objects
        .find(&oid)
        .await?
        .filter(|row| row.uploaded)
        .ok_or_else(|| ApiError::NotFound(MSG_OBJECT_NOT_FOUND.to_string()))?;

    let key = StorageKey::derive(row.hash_algo()?, &oid);
    let object = state.storage.get_stream(&key).await?;
    let size = object.size;
    DOWNLOAD_BYTES.inc_by(size);

    let oid_for_log = oid.clone();
    let body_stream = object.stream.map(move |result| {
        result.map_err(|e| {
            tracing::error!(oid = %oid_for_log, error = %e, "Download failed mid-transfer");
            std::io::Error::other(e.to_string())
        })
    });

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM)),
            (CONTENT_LENGTH, HeaderValue::from(size)),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}
