//! Route configuration.

use crate::auth::{lfs_auth_middleware, trace_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // The static `batch` and `verify` segments take priority over `{oid}`.
    let lfs_routes = Router::new()
        .route(
            "/{owner}/{name}/info/lfs/objects/batch",
            post(handlers::batch),
        )
        .route(
            "/{owner}/{name}/info/lfs/objects/verify",
            post(handlers::verify_object),
        )
        .route(
            "/{owner}/{name}/info/lfs/objects/{oid}",
            get(handlers::download_object).put(handlers::upload_object),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            lfs_auth_middleware,
        ));

    let public_routes = Router::new()
        // Probes are intentionally unauthenticated for load balancers/k8s
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/auth/github/login", get(handlers::login))
        .route("/auth/github/callback", get(handlers::callback));

    let mut router = Router::new().merge(lfs_routes).merge(public_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Order of execution: TraceLayer -> trace id -> LFS auth -> Handler
    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
