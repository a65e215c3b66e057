//! Redis cache backend.

use crate::error::{CacheError, CacheResult};
use crate::traits::KvCache;
use async_trait::async_trait;
use lfs_core::config::SecretString;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, IntoConnectionInfo};
use std::time::Duration;
use tracing::{info, instrument};

/// Cache backed by a Redis server.
///
/// Uses a multiplexed, auto-reconnecting [`ConnectionManager`]; clones share
/// the underlying connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// `password`, when given, replaces any password embedded in the URL.
    pub async fn connect(
        url: &str,
        password: Option<&SecretString>,
        connect_timeout: Duration,
    ) -> CacheResult<Self> {
        let mut info = url
            .into_connection_info()
            .map_err(|e| CacheError::Config(format!("invalid redis url: {e}")))?;
        if let Some(password) = password {
            info.redis.password = Some(password.expose().to_string());
        }

        // Address only; the URL may carry credentials.
        let addr = info.addr.to_string();
        let client = redis::Client::open(info)?;
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(format!("connecting to redis at {addr}")))??;

        info!(addr = %addr, "Connected to Redis cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    #[instrument(skip(self), fields(backend = "redis"))]
    async fn get(&self, key: &str) -> CacheResult<String> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        value.ok_or(CacheError::Miss)
    }

    #[instrument(skip(self, value), fields(backend = "redis"))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !ttl.is_zero() {
            // PX keeps sub-second TTLs meaningful.
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            cmd.arg("PX").arg(millis);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let present: bool = conn.exists(key).await?;
        Ok(present)
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn get_del(&self, key: &str) -> CacheResult<String> {
        let mut conn = self.conn.clone();
        // MULTI/EXEC so concurrent callers cannot both read the value.
        let (value, _removed): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(key)
            .del(key)
            .query_async(&mut conn)
            .await?;
        value.ok_or(CacheError::Miss)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn health_check(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(CacheError::Config(format!(
                "unexpected PING reply from redis: {pong}"
            )));
        }
        Ok(())
    }
}
