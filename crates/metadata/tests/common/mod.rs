//! Shared test utilities for the metadata crate.

#![allow(dead_code)]

use async_trait::async_trait;
use lfs_cache::{CacheError, CacheResult, KvCache};
use lfs_core::{HashAlgo, Oid, RepositoryName};
use lfs_metadata::models::{AccessPolicyRow, AllowlistRow, LfsObjectRow};
use lfs_metadata::{
    AccessPolicyRepo, AllowlistRepo, MetadataError, MetadataResult, MetadataStore, ObjectRepo,
    PostgresStore,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use time::OffsetDateTime;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

pub fn oid(seed: u8) -> Oid {
    Oid::parse(&format!("{seed:02x}").repeat(32)).unwrap()
}

pub fn repo(full_name: &str) -> RepositoryName {
    RepositoryName::parse(full_name).unwrap()
}

/// PostgreSQL store backed by a testcontainer.
pub struct PostgresTestMetadata {
    pub store: Arc<PostgresStore>,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
        let store = PostgresStore::from_url(&url, 5, Some(30_000)).await?;

        Ok(Self {
            store: Arc::new(store),
            _container: container,
        })
    }
}

/// Try to create a PostgreSQL test store, skipping if Docker is unavailable
/// or SKIP_POSTGRES_TESTS is set.
pub async fn postgres_or_skip() -> Option<PostgresTestMetadata> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestMetadata::new().await {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<String, LfsObjectRow>,
    policies: BTreeMap<String, AccessPolicyRow>,
    allowlist: BTreeMap<String, AllowlistRow>,
    next_id: i32,
}

/// In-memory metadata store that counts reads, for cache behaviour tests.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
    pub object_reads: AtomicUsize,
    pub allowlist_reads: AtomicUsize,
}

impl FakeStore {
    pub fn object_reads(&self) -> usize {
        self.object_reads.load(Ordering::SeqCst)
    }

    pub fn allowlist_reads(&self) -> usize {
        self.allowlist_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectRepo for FakeStore {
    async fn find_object(&self, oid: &Oid) -> MetadataResult<Option<LfsObjectRow>> {
        self.object_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().objects.get(oid.as_str()).cloned())
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
        if existing.uploaded && !row.uploaded {
            return Err(MetadataError::InvalidStateTransition {
                from: "uploaded".to_string(),
                to: "pending".to_string(),
            });
        }
        existing.size = row.size;
        existing.uploaded = row.uploaded;
        existing.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn object_exists(&self, oid: &Oid) -> MetadataResult<bool> {
        self.object_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().objects.contains_key(oid.as_str()))
    }

    async fn mark_uploaded(&self, oid: &Oid) -> MetadataResult<LfsObjectRow> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .objects
            .get_mut(oid.as_str())
            .ok_or_else(|| MetadataError::NotFound(oid.to_string()))?;
        row.uploaded = true;
        Ok(row.clone())
    }
}

#[async_trait]
impl AccessPolicyRepo for FakeStore {
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
impl AllowlistRepo for FakeStore {
    async fn is_repository_allowed(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        self.allowlist_reads.fetch_add(1, Ordering::SeqCst);
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
impl MetadataStore for FakeStore {
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

/// A cache whose every operation fails with a transport error.
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
}
