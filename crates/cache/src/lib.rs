//! Key-value cache for the Git LFS proxy.
//!
//! This crate provides:
//! - The [`KvCache`] trait with a miss sentinel distinct from transport errors
//! - JSON helpers via [`KvCacheJsonExt`]
//! - Backends: Redis and in-process memory

pub mod error;
pub mod memory;
pub mod redis;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use crate::redis::RedisCache;
pub use traits::{KvCache, KvCacheJsonExt};

use lfs_core::config::CacheConfig;
use std::sync::Arc;
use std::time::Duration;

/// Observer called with a component label whenever a read falls back past
/// a failing cache.
pub type FallthroughHook = Arc<dyn Fn(&'static str) + Send + Sync>;

/// Create a cache from configuration.
pub async fn from_config(config: &CacheConfig) -> CacheResult<Arc<dyn KvCache>> {
    config.validate().map_err(CacheError::Config)?;

    match config {
        CacheConfig::Redis {
            url,
            password,
            connect_timeout_secs,
        } => {
            let cache = RedisCache::connect(
                url,
                password.as_ref(),
                Duration::from_secs(*connect_timeout_secs),
            )
            .await?;
            Ok(Arc::new(cache))
        }
        CacheConfig::Memory => {
            tracing::warn!("Using in-process cache; state is not shared between replicas");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}
