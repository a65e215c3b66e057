//! Liveness and readiness probes. Both are unauthenticated.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use lfs_cache::KvCache;
use lfs_metadata::MetadataStore;
use lfs_storage::ObjectStore;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Upper bound for each readiness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health of one dependency.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub details: Vec<ComponentHealth>,
}

/// GET /healthz
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// GET /readyz
///
/// Component names are fixed (`postgres`, `redis`, `s3`) whichever backends
/// are configured.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let (postgres, redis, s3) = tokio::join!(
        probe("postgres", state.metadata.health_check()),
        probe("redis", state.cache.health_check()),
        probe("s3", state.storage.health_check()),
    );
    let details = vec![postgres, redis, s3];

    if details.iter().all(|c| c.healthy) {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                details,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                details,
            }),
        )
    }
}

async fn probe<F, E>(name: &'static str, check: F) -> ComponentHealth
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let healthy = match tokio::time::timeout(PROBE_TIMEOUT, check).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(component = name, error = %e, "Readiness probe failed");
            false
        }
        Err(_) => {
            tracing::warn!(component = name, "Readiness probe timed out");
            false
        }
    };
    ComponentHealth { name, healthy }
}
