//! Server test utilities.

#![allow(dead_code)]

use super::fixtures::{actions_token, jwks_document};
use super::metadata::MemoryMetadata;
use super::storage::MemoryObjectStore;
use axum::Router;
use axum::body::Body;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use lfs_auth::GITHUB_ACTIONS_PROVIDER;
use lfs_cache::{KvCache, KvCacheJsonExt, MemoryCache};
use lfs_core::config::AppConfig;
use lfs_core::{LFS_MEDIA_TYPE, RepositoryName, keys};
use lfs_metadata::AllowlistRepo;
use lfs_server::{AppState, create_router};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// A test server wrapper with in-memory dependencies.
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    pub metadata: Arc<MemoryMetadata>,
    pub storage: MemoryObjectStore,
    pub cache: Arc<dyn KvCache>,
}

impl TestServer {
    /// A server with the memory cache and the test JWKS pre-cached, so token
    /// verification never leaves the process.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let cache: Arc<dyn KvCache> = Arc::new(MemoryCache::new());
        cache
            .set_json(
                &keys::jwks_key(GITHUB_ACTIONS_PROVIDER),
                &jwks_document(),
                Duration::from_secs(3600),
            )
            .await
            .expect("seed JWKS");
        Self::build(modifier, cache).await
    }

    /// A server whose cache fails every operation.
    pub async fn with_cache(cache: Arc<dyn KvCache>) -> Self {
        Self::build(|_| {}, cache).await
    }

    async fn build<F>(modifier: F, cache: Arc<dyn KvCache>) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        let metadata = Arc::new(MemoryMetadata::default());
        let storage = MemoryObjectStore::default();
        let state = AppState::new(
            config,
            metadata.clone(),
            cache.clone(),
            Arc::new(storage.clone()),
        )
        .expect("Failed to build app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            metadata,
            storage,
            cache,
        }
    }

    /// Allowlist a repository directly in the store.
    pub async fn allow(&self, repository: &str) -> RepositoryName {
        let repo = RepositoryName::parse(repository).unwrap();
        self.metadata.add_repository(&repo).await.unwrap();
        repo
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// POST a Batch API request authenticated as an Actions workload of
    /// `repository`.
    pub async fn batch(&self, repository: &str, body: Value) -> Response {
        self.send(batch_request(repository, &actions_token(repository), body))
            .await
    }
}

/// Batch request with the LFS headers and `token`.
pub fn batch_request(repository: &str, token: &str, body: Value) -> Request<Body> {
    lfs_json_request(
        &format!("/{repository}/info/lfs/objects/batch"),
        Some(token),
        body,
    )
}

/// POST with the LFS media type on both `Accept` and `Content-Type`.
pub fn lfs_json_request(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(ACCEPT, LFS_MEDIA_TYPE)
        .header(CONTENT_TYPE, LFS_MEDIA_TYPE);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// PUT `data` to an absolute proxy `href`.
pub fn put_request(href: &str, data: impl Into<bytes::Bytes>) -> Request<Body> {
    let data = data.into();
    Request::builder()
        .method("PUT")
        .uri(path_and_query(href))
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, data.len())
        .body(Body::from(data))
        .unwrap()
}

pub fn get_request(href: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path_and_query(href))
        .body(Body::empty())
        .unwrap()
}

/// Strip scheme and host: the router only sees paths.
pub fn path_and_query(href: &str) -> String {
    let url = url::Url::parse(href).unwrap();
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the LFS 401 shape.
pub fn assert_lfs_unauthorized(response: &Response) {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("lfs-authenticate").unwrap(),
        "Basic realm=\"Git LFS\""
    );
}
