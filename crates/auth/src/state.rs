//! Single-use OAuth `state` records.

use crate::error::{AuthError, AuthResult};
use crate::identity::OAuthState;
use lfs_cache::{KvCache, KvCacheJsonExt};
use lfs_core::keys;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

const STATE_BYTES: usize = 32;

#[derive(Clone)]
pub struct OAuthStateStore {
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl: keys::ttl_or(ttl, keys::OAUTH_STATE_TTL),
        }
    }

    /// Store `state` under a fresh random value and return that value.
    pub async fn issue(&self, state: &OAuthState) -> AuthResult<String> {
        let mut bytes = [0u8; STATE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let value = hex::encode(bytes);
        self.cache
            .set_json(&keys::oauth_state_key(&value), state, self.ttl)
            .await?;
        Ok(value)
    }

    /// Take the record for `value`. A second call for the same value fails.
    pub async fn consume(&self, value: &str) -> AuthResult<OAuthState> {
        let well_formed = value.len() == STATE_BYTES * 2
            && value.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(AuthError::StateNotFound);
        }
        match self.cache.get_del_json(&keys::oauth_state_key(value)).await {
            Ok(state) => Ok(state),
            Err(e) if e.is_miss() => Err(AuthError::StateNotFound),
            Err(e) => Err(e.into()),
        }
    }
}
