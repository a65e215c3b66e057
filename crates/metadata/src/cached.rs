//! Cache-fronted views over the metadata store.
//!
//! SQL stays authoritative. Writes go to SQL first and refresh the cache on
//! a best-effort basis; cache failures are logged and never surface to the
//! caller.

use crate::error::MetadataResult;
use crate::models::{AllowlistRow, LfsObjectRow};
use crate::store::MetadataStore;
use lfs_cache::{CacheError, FallthroughHook, KvCache, KvCacheJsonExt};
use lfs_core::keys::{self, ttl_or};
use lfs_core::{HashAlgo, Oid, RepositoryName};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

fn report_fallthrough(hook: &Option<FallthroughHook>, component: &'static str, err: &CacheError) {
    warn!(component, error = %err, "Cache unavailable, falling through to database");
    if let Some(hook) = hook {
        hook(component);
    }
}

/// Object metadata with a write-through cache under `lfs:meta:<oid>`.
#[derive(Clone)]
pub struct ObjectMetadataStore {
    store: Arc<dyn MetadataStore>,
    cache: Arc<dyn KvCache>,
    ttl: Duration,
    on_fallthrough: Option<FallthroughHook>,
}

impl ObjectMetadataStore {
    const COMPONENT: &'static str = "object_metadata";

    /// A zero `ttl` selects the 30 minute default.
    pub fn new(store: Arc<dyn MetadataStore>, cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self {
            store,
            cache,
            ttl: ttl_or(ttl, keys::METADATA_TTL),
            on_fallthrough: None,
        }
    }

    pub fn with_fallthrough_hook(mut self, hook: FallthroughHook) -> Self {
        self.on_fallthrough = Some(hook);
        self
    }

    /// Underlying store, for the uncached repositories.
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Find an object, preferring the cached projection.
    pub async fn find(&self, oid: &Oid) -> MetadataResult<Option<LfsObjectRow>> {
        let key = keys::object_meta_key(oid);
        match self.cache.get_json::<LfsObjectRow>(&key).await {
            Ok(row) if row.oid == oid.as_str() => return Ok(Some(row)),
            Ok(_) => debug!(oid = %oid, "Cached metadata names another oid, ignoring"),
            Err(CacheError::Miss) => {}
            Err(CacheError::Serialization(e)) => {
                debug!(oid = %oid, error = %e, "Unparseable cached metadata, ignoring")
            }
            Err(e) => report_fallthrough(&self.on_fallthrough, Self::COMPONENT, &e),
        }

        let row = self.store.find_object(oid).await?;
        if let Some(row) = &row {
            self.refresh(row).await;
        }
        Ok(row)
    }

    /// Insert a new object.
    pub async fn save(&self, row: &LfsObjectRow) -> MetadataResult<()> {
        self.store.create_object(row).await?;
        self.refresh(row).await;
        Ok(())
    }

    /// Update an existing object.
    pub async fn update(&self, row: &LfsObjectRow) -> MetadataResult<()> {
        self.store.update_object(row).await?;
        match self.store.find_object(&row.oid()?).await? {
            Some(stored) => self.refresh(&stored).await,
            None => self.invalidate(&row.oid()?).await,
        }
        Ok(())
    }

    /// Whether the object exists. A cache hit answers alone; a miss or a
    /// cache failure defers to SQL.
    pub async fn exists(&self, oid: &Oid) -> MetadataResult<bool> {
        match self.cache.exists(&keys::object_meta_key(oid)).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => report_fallthrough(&self.on_fallthrough, Self::COMPONENT, &e),
        }
        self.store.object_exists(oid).await
    }

    /// Mark an object uploaded and refresh its cached projection.
    pub async fn mark_uploaded(&self, oid: &Oid) -> MetadataResult<LfsObjectRow> {
        let row = self.store.mark_uploaded(oid).await?;
        self.refresh(&row).await;
        Ok(row)
    }

    /// Record an upload intent (object row plus access policy) atomically.
    pub async fn prepare_upload(
        &self,
        oid: &Oid,
        size: i64,
        algo: HashAlgo,
        repo: &RepositoryName,
    ) -> MetadataResult<LfsObjectRow> {
        let row = self.store.prepare_upload(oid, size, algo, repo).await?;
        self.refresh(&row).await;
        Ok(row)
    }

    /// Only uploaded rows are cached. `uploaded` never reverts, so a fill
    /// racing `mark_uploaded` can at worst drop the entry, never hide the
    /// completed upload behind a pending one.
    async fn refresh(&self, row: &LfsObjectRow) {
        let Ok(oid) = row.oid() else {
            return;
        };
        if !row.uploaded {
            self.invalidate(&oid).await;
            return;
        }
        let key = keys::object_meta_key(&oid);
        if let Err(e) = self.cache.set_json(&key, row, self.ttl).await {
            warn!(oid = %row.oid, error = %e, "Failed to refresh cached object metadata");
            // A stale pending entry would hide a completed upload.
            if let Err(e) = self.cache.delete(&key).await {
                debug!(oid = %row.oid, error = %e, "Failed to drop stale cached metadata");
            }
        }
    }

    async fn invalidate(&self, oid: &Oid) {
        if let Err(e) = self.cache.delete(&keys::object_meta_key(oid)).await {
            debug!(oid = %oid, error = %e, "Failed to drop cached metadata");
        }
    }
}

/// Repository allowlist with cached membership under
/// `lfs:oidc:github:repo:<owner>/<name>`.
#[derive(Clone)]
pub struct RepositoryAllowlist {
    store: Arc<dyn MetadataStore>,
    cache: Arc<dyn KvCache>,
    ttl: Duration,
    on_fallthrough: Option<FallthroughHook>,
}

impl RepositoryAllowlist {
    const COMPONENT: &'static str = "allowlist";

    /// A zero `ttl` selects the 5 minute default.
    pub fn new(store: Arc<dyn MetadataStore>, cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self {
            store,
            cache,
            ttl: ttl_or(ttl, keys::ALLOWLIST_TTL),
            on_fallthrough: None,
        }
    }

    pub fn with_fallthrough_hook(mut self, hook: FallthroughHook) -> Self {
        self.on_fallthrough = Some(hook);
        self
    }

    /// Membership check. Both answers are cached.
    pub async fn is_allowed(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        let key = keys::github_repo_key(repo);
        match self.cache.get(&key).await.as_deref() {
            Ok("true") => return Ok(true),
            Ok("false") => return Ok(false),
            Ok(other) => debug!(repository = %repo, value = other, "Unexpected cached allowlist value"),
            Err(CacheError::Miss) => {}
            Err(e) => report_fallthrough(&self.on_fallthrough, Self::COMPONENT, e),
        }

        let allowed = self.store.is_repository_allowed(repo).await?;
        let value = if allowed { "true" } else { "false" };
        if let Err(e) = self.cache.set(&key, value, self.ttl).await {
            debug!(repository = %repo, error = %e, "Failed to cache allowlist answer");
        }
        Ok(allowed)
    }

    /// Add a repository. Returns `false` if it was already present.
    pub async fn add(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        let inserted = self.store.add_repository(repo).await?;
        if let Err(e) = self
            .cache
            .set(&keys::github_repo_key(repo), "true", self.ttl)
            .await
        {
            warn!(repository = %repo, error = %e, "Failed to cache allowlist addition");
        }
        Ok(inserted)
    }

    /// Remove a repository. Returns `NotFound` if it was not present; the
    /// cached entry is dropped either way.
    pub async fn remove(&self, repo: &RepositoryName) -> MetadataResult<()> {
        let result = self.store.remove_repository(repo).await;
        if let Err(e) = self.cache.delete(&keys::github_repo_key(repo)).await {
            warn!(repository = %repo, error = %e, "Failed to drop cached allowlist entry");
        }
        result
    }

    /// All allowlisted repositories, ordered by name.
    pub async fn list(&self) -> MetadataResult<Vec<AllowlistRow>> {
        self.store.list_repositories().await
    }
}
