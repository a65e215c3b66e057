//! Batch API: negotiates upload and download actions for a set of objects.

use crate::auth::{get_trace_id, require_lfs_context};
use crate::error::{ApiError, ApiResult, MSG_SIZE_MISMATCH};
use crate::metrics::{BATCH_REQUESTS, record_batch_object};
use crate::protocol::{
    Action, Actions, BatchRequest, BatchResponse, LfsJson, ObjectEntry, Operation, parse_body,
};
use crate::signing::{ProxyOperation, SignedUrl};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use lfs_core::{HashAlgo, Oid, RepositoryName};
use lfs_metadata::AccessPolicyRepo;
use lfs_metadata::models::LfsObjectRow;
use time::OffsetDateTime;

/// Maximum batch request body size (10 MiB).
const MAX_BATCH_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Per-object error message for downloads of absent or pending objects.
const OBJECT_NOT_FOUND: &str = "object not found";

impl From<SignedUrl> for Action {
    fn from(url: SignedUrl) -> Self {
        Self {
            href: url.href,
            expires_in: url.expires_in,
        }
    }
}

/// POST /{owner}/{name}/info/lfs/objects/batch
pub async fn batch(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<LfsJson<BatchResponse>> {
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();
    let ctx = require_lfs_context(&req)?.clone();

    let body: BatchRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_BATCH_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        parse_body(&bytes)?
    };
    if let Some(transfers) = &body.transfers
        && !transfers.iter().any(|t| t == lfs_core::BASIC_TRANSFER)
    {
        tracing::debug!(?transfers, "Client did not offer basic transfer; answering basic");
    }

    let batch = body.validate(state.config.server.max_batch_objects)?;
    BATCH_REQUESTS
        .with_label_values(&[batch.operation.as_str()])
        .inc();

    tracing::info!(
        trace_id = %trace_id,
        repository = %ctx.repository,
        operation = batch.operation.as_str(),
        objects = batch.objects.len(),
        caller = ctx.caller_kind(),
        "Batch request"
    );

    let now = OffsetDateTime::now_utc();
    let objects = match batch.operation {
        Operation::Upload => {
            let mut entries = Vec::with_capacity(batch.objects.len());
            for (oid, size) in &batch.objects {
                entries.push(
                    upload_entry(&state, &ctx.repository, oid, *size, batch.hash_algo, now).await?,
                );
            }
            entries
        }
        Operation::Download => {
            download_entries(&state, &ctx.repository, &batch.objects, now).await?
        }
    };

    Ok(LfsJson(BatchResponse::basic(batch.hash_algo, objects)))
}

async fn upload_entry(
    state: &AppState,
    repo: &RepositoryName,
    oid: &Oid,
    size: i64,
    algo: HashAlgo,
    now: OffsetDateTime,
) -> ApiResult<ObjectEntry> {
    if let Some(existing) = state.objects.find(oid).await?
        && existing.uploaded
    {
        return already_uploaded(state, repo, oid, size, &existing).await;
    }

    let row = state.objects.prepare_upload(oid, size, algo, repo).await?;
    if row.uploaded {
        // Verified between our lookup and the transaction.
        record_batch_object("upload", "present");
        return Ok(ObjectEntry::present(oid, row.size));
    }

    record_batch_object("upload", "upload");
    let upload = state
        .signer
        .sign_url(ProxyOperation::Upload, repo, Some(oid), now);
    let verify = state.signer.sign_url(ProxyOperation::Verify, repo, None, now);
    Ok(ObjectEntry::with_actions(
        oid,
        size,
        Actions {
            upload: Some(upload.into()),
            verify: Some(verify.into()),
            ..Actions::default()
        },
    ))
}

/// An uploaded object needs no transfer. Its policy moves to the requesting
/// repository.
async fn already_uploaded(
    state: &AppState,
    repo: &RepositoryName,
    oid: &Oid,
    size: i64,
    existing: &LfsObjectRow,
) -> ApiResult<ObjectEntry> {
    if existing.size != size {
        record_batch_object("upload", "size_mismatch");
        return Ok(ObjectEntry::failed(
            oid,
            size,
            StatusCode::UNPROCESSABLE_ENTITY,
            MSG_SIZE_MISMATCH,
        ));
    }

    state.metadata.save_access_policy(oid, repo).await?;
    record_batch_object("upload", "present");
    Ok(ObjectEntry::present(oid, existing.size))
}

async fn download_entries(
    state: &AppState,
    repo: &RepositoryName,
    objects: &[(Oid, i64)],
    now: OffsetDateTime,
) -> ApiResult<Vec<ObjectEntry>> {
    // Provenance first: any object this repository may not read fails the
    // whole request.
    for (oid, _) in objects {
        let allowed = state
            .metadata
            .find_access_policy(oid)
            .await?
            .is_some_and(|policy| policy.allows(repo));
        if !allowed {
            record_batch_object("download", "forbidden");
            tracing::info!(oid = %oid, repository = %repo, "Download denied by access policy");
            return Err(ApiError::Forbidden(
                "access to one or more objects is denied".to_string(),
            ));
        }
    }

    let mut entries = Vec::with_capacity(objects.len());
    for (oid, size) in objects {
        let entry = match state.objects.find(oid).await? {
            Some(row) if row.uploaded => {
                record_batch_object("download", "download");
                let download = state
                    .signer
                    .sign_url(ProxyOperation::Download, repo, Some(oid), now);
                ObjectEntry::with_actions(
                    oid,
                    row.size,
                    Actions {
                        download: Some(download.into()),
                        ..Actions::default()
                    },
                )
            }
            _ => {
                record_batch_object("download", "not_found");
                ObjectEntry::failed(oid, *size, StatusCode::NOT_FOUND, OBJECT_NOT_FOUND)
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}
