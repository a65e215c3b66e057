//! Server-side sessions for users who signed in through OAuth.

use crate::error::{AuthError, AuthResult};
use crate::identity::UserInfo;
use lfs_cache::{KvCache, KvCacheJsonExt};
use lfs_core::keys;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Sessions live in the cache under `lfs:session:<uuid>`.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn KvCache>,
    default_ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn KvCache>, default_ttl: Duration) -> Self {
        Self {
            cache,
            default_ttl: keys::ttl_or(default_ttl, keys::SESSION_TTL),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `info` under a fresh session id. A zero `ttl` selects the default.
    pub async fn create_session(&self, info: &UserInfo, ttl: Duration) -> AuthResult<String> {
        let session_id = Uuid::new_v4().to_string();
        self.cache
            .set_json(
                &keys::session_key(&session_id),
                info,
                keys::ttl_or(ttl, self.default_ttl),
            )
            .await?;
        tracing::debug!(sub = %info.sub, "Session created");
        Ok(session_id)
    }

    pub async fn get_session(&self, session_id: &str) -> AuthResult<UserInfo> {
        // Anything that is not one of our ids cannot name a session.
        if Uuid::parse_str(session_id).is_err() {
            return Err(AuthError::SessionNotFound);
        }
        match self.cache.get_json(&keys::session_key(session_id)).await {
            Ok(info) => Ok(info),
            Err(e) if e.is_miss() => Err(AuthError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> AuthResult<()> {
        self.cache.delete(&keys::session_key(session_id)).await?;
        Ok(())
    }
}
