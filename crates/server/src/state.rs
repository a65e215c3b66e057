//! Application state shared across handlers.

use crate::metrics::cache_fallthrough_hook;
use crate::signing::ProxyUrlSigner;
use anyhow::{Context, Result};
use lfs_auth::{GitHubActionsProvider, GitHubOAuthClient, OAuthStateStore, SessionStore};
use lfs_cache::KvCache;
use lfs_core::config::AppConfig;
use lfs_metadata::{MetadataStore, ObjectMetadataStore, RepositoryAllowlist};
use lfs_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Authoritative metadata store (access policies, health).
    pub metadata: Arc<dyn MetadataStore>,
    /// Cache-fronted object metadata.
    pub objects: ObjectMetadataStore,
    /// Cache-fronted repository allowlist.
    pub allowlist: RepositoryAllowlist,
    /// Key-value cache.
    pub cache: Arc<dyn KvCache>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// GitHub Actions OIDC verification.
    pub oidc: Arc<GitHubActionsProvider>,
    /// GitHub OAuth client, when OAuth is configured.
    pub oauth: Option<Arc<GitHubOAuthClient>>,
    pub sessions: SessionStore,
    pub oauth_states: OAuthStateStore,
    /// Proxy URL signer.
    pub signer: ProxyUrlSigner,
}

impl AppState {
    /// Create the application state.
    ///
    /// Validates the configuration first; an invalid configuration is an
    /// error rather than a degraded server.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        cache: Arc<dyn KvCache>,
        storage: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let objects = ObjectMetadataStore::new(metadata.clone(), cache.clone(), config.ttl.metadata())
            .with_fallthrough_hook(cache_fallthrough_hook());
        let allowlist =
            RepositoryAllowlist::new(metadata.clone(), cache.clone(), config.ttl.allowlist())
                .with_fallthrough_hook(cache_fallthrough_hook());

        let oidc = lfs_auth::github_actions_from_config(&config, cache.clone())
            .context("failed to initialize GitHub Actions OIDC")?;
        let oauth = lfs_auth::github_oauth_from_config(&config)
            .context("failed to initialize GitHub OAuth")?;
        if oauth.is_none() {
            tracing::info!("GitHub OAuth not configured; /auth/github endpoints disabled");
        }

        let sessions = SessionStore::new(cache.clone(), config.ttl.session());
        let oauth_states = OAuthStateStore::new(cache.clone(), config.ttl.oauth_state());
        let signer = ProxyUrlSigner::from_config(&config.server)
            .map_err(|e| anyhow::anyhow!("invalid url signing key: {e}"))?;

        Ok(Self {
            config: Arc::new(config),
            metadata,
            objects,
            allowlist,
            cache,
            storage,
            oidc: Arc::new(oidc),
            oauth: oauth.map(Arc::new),
            sessions,
            oauth_states,
            signer,
        })
    }
}
