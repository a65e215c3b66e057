//! Verify: confirms a proxied upload landed and marks the object uploaded.

use crate::auth::{get_trace_id, require_lfs_context};
use crate::error::{ApiError, ApiResult, MSG_OBJECT_NOT_FOUND, MSG_SIZE_MISMATCH};
use crate::metrics::VERIFY_COMPLETED;
use crate::protocol::{VerifyRequest, parse_body};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use lfs_core::StorageKey;
use lfs_metadata::AccessPolicyRepo;
use lfs_storage::ObjectStore;

/// Verify bodies are tiny; anything larger is not a verify request.
const MAX_VERIFY_BODY_SIZE: usize = 64 * 1024;

/// POST /{owner}/{name}/info/lfs/objects/verify
///
/// Idempotent: verifying an uploaded object answers 200 again.
pub async fn verify_object(State(state): State<AppState>, req: Request) -> ApiResult<StatusCode> {
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let repo = require_lfs_context(&req)?.repository.clone();

    let body: VerifyRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_VERIFY_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        parse_body(&bytes)?
    };
    let (oid, size) = body.validate()?;

    let row = state
        .objects
        .find(&oid)
        .await?
        .ok_or_else(|| ApiError::NotFound(MSG_OBJECT_NOT_FOUND.to_string()))?;
    if row.size != size {
        return Err(ApiError::Unprocessable(MSG_SIZE_MISMATCH.to_string()));
    }
    if let Some(policy) = state.metadata.find_access_policy(&oid).await?
        && !policy.allows(&repo)
    {
        return Err(ApiError::Forbidden(
            "access to this object is denied".to_string(),
        ));
    }

    let key = StorageKey::derive(row.hash_algo()?, &oid);
    let stored = state.storage.head(&key).await?;
    if stored.size != row.size_bytes() {
        tracing::warn!(
            trace_id = %trace_id,
            oid = %oid,
            expected = row.size,
            actual = stored.size,
            "Stored object size disagrees with metadata"
        );
        return Err(ApiError::Unprocessable(MSG_SIZE_MISMATCH.to_string()));
    }

    if !row.uploaded {
        state.objects.mark_uploaded(&oid).await?;
        VERIFY_COMPLETED.inc();
        tracing::info!(trace_id = %trace_id, oid = %oid, repository = %repo, "Object verified");
    }
    Ok(StatusCode::OK)
}
