//! In-process cache backend.

use crate::error::{CacheError, CacheResult};
use crate::traits::KvCache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Writes between sweeps of expired entries.
const SWEEP_INTERVAL: usize = 1024;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Cache held in process memory.
///
/// Suitable for a single replica and for tests. Expired entries are
/// evicted on access and swept periodically on write, so keys that
/// are written once and never read again do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Err(CacheError::Miss)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(CacheError::Miss) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_del(&self, key: &str) -> CacheResult<String> {
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(Instant::now()) => Ok(entry.value),
            _ => Err(CacheError::Miss),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
