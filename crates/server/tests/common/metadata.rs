//! In-memory metadata store and a failing cache.

#![allow(dead_code)]

use async_trait::async_trait;
use lfs_cache::{CacheError, CacheResult, KvCache};
use lfs_core::{HashAlgo, Oid, RepositoryName};
use lfs_metadata::models::{AccessPolicyRow, AllowlistRow, LfsObjectRow};
use lfs_metadata::{
    AccessPolicyRepo, AllowlistRepo, MetadataError, MetadataResult, MetadataStore, ObjectRepo,
};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, LfsObjectRow>,
    policies: BTreeMap<String, AccessPolicyRow>,
    allowlist: BTreeMap<String, AllowlistRow>,
    next_id: i32,
}

/// Metadata store holding everything in process memory, with the same
/// upsert semantics as the PostgreSQL store.
#[derive(Default)]
pub struct MemoryMetadata {
    state: Mutex<MemoryState>,
}

impl MemoryMetadata {
    /// Direct read, bypassing any cache.
    pub fn object(&self, oid: &Oid) -> Option<LfsObjectRow> {
        self.state.lock().unwrap().objects.get(oid.as_str()).cloned()
    }

    pub fn policy_repository(&self, oid: &Oid) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(oid.as_str())
            .map(|p| p.repository.clone())
    }
}

#[async_trait]
impl ObjectRepo for MemoryMetadata {
    async fn find_object(&self, oid: &Oid) -> MetadataResult<Option<LfsObjectRow>> {
        Ok(self.object(oid))
    }

    async fn create_object(&self, row: &LfsObjectRow) -> MetadataResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(&row.oid) {
            return Err(MetadataError::AlreadyExists(row.oid.clone()));
        }
        state.objects.insert(row.oid.clone(), row.clone());
        Ok(())
    }

    async fn update_object(&self, row: &LfsObjectRow) -> MetadataResult<()> {
        let mut state = self.state.lock().unwrap();
        let existing = state
            .objects
            .get_mut(&row.oid)
            .ok_or_else(|| MetadataError::NotFound(row.oid.clone()))?;
        existing.size = row.size;
        existing.uploaded = row.uploaded;
        existing.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn object_exists(&self, oid: &Oid) -> MetadataResult<bool> {
        Ok(self.object(oid).is_some())
    }

    async fn mark_uploaded(&self, oid: &Oid) -> MetadataResult<LfsObjectRow> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .objects
            .get_mut(oid.as_str())
            .ok_or_else(|| MetadataError::NotFound(oid.to_string()))?;
        row.uploaded = true;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }
}

#[async_trait]
impl AccessPolicyRepo for MemoryMetadata {
    async fn find_access_policy(&self, oid: &Oid) -> MetadataResult<Option<AccessPolicyRow>> {
        Ok(self.state.lock().unwrap().policies.get(oid.as_str()).cloned())
    }

    async fn save_access_policy(
        &self,
        oid: &Oid,
        repo: &RepositoryName,
    ) -> MetadataResult<AccessPolicyRow> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let row = state
            .policies
            .entry(oid.to_string())
            .or_insert_with(|| AccessPolicyRow {
                id,
                lfs_object_oid: oid.to_string(),
                repository: repo.full_name(),
                created_at: OffsetDateTime::now_utc(),
            });
        row.repository = repo.full_name();
        Ok(row.clone())
    }

    async fn delete_access_policy(&self, oid: &Oid) -> MetadataResult<()> {
        self.state
            .lock()
            .unwrap()
            .policies
            .remove(oid.as_str())
            .map(|_| ())
            .ok_or_else(|| MetadataError::NotFound(oid.to_string()))
    }
}

#[async_trait]
impl AllowlistRepo for MemoryMetadata {
    async fn is_repository_allowed(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .allowlist
            .contains_key(&repo.full_name()))
    }

    async fn add_repository(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.allowlist.contains_key(&repo.full_name()) {
            return Ok(false);
        }
        state.next_id += 1;
        let row = AllowlistRow {
            id: state.next_id,
            repository: repo.full_name(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.allowlist.insert(repo.full_name(), row);
        Ok(true)
    }

    async fn remove_repository(&self, repo: &RepositoryName) -> MetadataResult<()> {
        self.state
            .lock()
            .unwrap()
            .allowlist
            .remove(&repo.full_name())
            .map(|_| ())
            .ok_or_else(|| MetadataError::NotFound(repo.full_name()))
    }

    async fn list_repositories(&self) -> MetadataResult<Vec<AllowlistRow>> {
        Ok(self.state.lock().unwrap().allowlist.values().cloned().collect())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn prepare_upload(
        &self,
        oid: &Oid,
        size: i64,
        algo: HashAlgo,
        repo: &RepositoryName,
    ) -> MetadataResult<LfsObjectRow> {
        let row = {
            let mut state = self.state.lock().unwrap();
            let row = state
                .objects
                .entry(oid.to_string())
                .or_insert_with(|| LfsObjectRow::pending(oid, size, algo));
            if !row.uploaded {
                row.size = size;
            }
            row.clone()
        };
        self.save_access_policy(oid, repo).await?;
        Ok(row)
    }
}

/// A cache whose every operation, health check included, fails.
pub struct DownCache;

#[async_trait]
impl KvCache for DownCache {
    async fn get(&self, _key: &str) -> CacheResult<String> {
        Err(CacheError::Timeout("cache down".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Timeout("cache down".to_string()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Timeout("cache down".to_string()))
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::Timeout("cache down".to_string()))
    }

    async fn get_del(&self, _key: &str) -> CacheResult<String> {
        Err(CacheError::Timeout("cache down".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "down"
    }

    async fn health_check(&self) -> CacheResult<()> {
        Err(CacheError::Timeout("cache down".to_string()))
    }
}
