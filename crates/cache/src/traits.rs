//! Cache trait definitions.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// String key-value cache with per-key expiry.
#[async_trait]
pub trait KvCache: Send + Sync + 'static {
    /// Get a value. Absent or expired keys yield [`CacheError::Miss`].
    async fn get(&self, key: &str) -> CacheResult<String>;

    /// Set a value. A zero `ttl` stores the key without expiry; callers
    /// resolve their own defaults with [`lfs_core::keys::ttl_or`] first.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete a key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Check whether a key is present.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Atomically read and delete a key.
    ///
    /// At most one concurrent caller observes the value.
    async fn get_del(&self, key: &str) -> CacheResult<String>;

    /// Get the name of this cache backend (for metrics and logging).
    fn backend_name(&self) -> &'static str;

    /// Verify cache connectivity.
    async fn health_check(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// JSON helpers layered on [`KvCache`].
///
/// Provided for every cache via a blanket implementation, including
/// `dyn KvCache`.
#[async_trait]
pub trait KvCacheJsonExt: KvCache {
    /// Serialize `value` as JSON and store it.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }

    /// Load and deserialize a JSON value.
    async fn get_json<T>(&self, key: &str) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.get(key).await?;
        serde_json::from_str(&raw).map_err(CacheError::from)
    }

    /// Atomically take and deserialize a JSON value.
    async fn get_del_json<T>(&self, key: &str) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.get_del(key).await?;
        serde_json::from_str(&raw).map_err(CacheError::from)
    }
}

impl<C: KvCache + ?Sized> KvCacheJsonExt for C {}
