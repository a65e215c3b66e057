//! JWKS retrieval with a shared cache in front of the issuer.

use crate::error::{AuthError, AuthResult};
use crate::http::{MAX_BODY_BYTES, build_client, read_capped};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use lfs_cache::{KvCache, KvCacheJsonExt};
use lfs_core::keys;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A single RSA signing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: String,
    pub kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Modulus, base64url without padding.
    #[serde(default)]
    pub n: String,
    /// Public exponent, base64url without padding.
    #[serde(default)]
    pub e: String,
}

impl Jwk {
    /// Build a signature-verification key from the RSA components.
    pub fn decoding_key(&self) -> AuthResult<DecodingKey> {
        if self.kty != "RSA" {
            return Err(AuthError::InvalidJwk(format!("unsupported kty {}", self.kty)));
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(AuthError::InvalidJwk("key is not a signing key".to_string()));
        }

        let modulus = URL_SAFE_NO_PAD
            .decode(&self.n)
            .map_err(|e| AuthError::InvalidJwk(format!("modulus: {e}")))?;
        if modulus.iter().all(|b| *b == 0) {
            return Err(AuthError::InvalidJwk("empty modulus".to_string()));
        }
        let exponent = URL_SAFE_NO_PAD
            .decode(&self.e)
            .map_err(|e| AuthError::InvalidJwk(format!("exponent: {e}")))?;
        decode_exponent(&exponent)?;

        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| AuthError::InvalidJwk(e.to_string()))
    }
}

/// Interpret big-endian exponent bytes, which must fit in an `i32`.
fn decode_exponent(bytes: &[u8]) -> AuthResult<i32> {
    let significant: &[u8] = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => return Err(AuthError::InvalidJwk("zero exponent".to_string())),
    };
    if significant.len() > 4 {
        return Err(AuthError::ExponentOutOfRange);
    }
    let value = significant
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    i32::try_from(value).map_err(|_| AuthError::ExponentOutOfRange)
}

/// A JSON Web Key Set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// Resolves signing keys by `(provider, kid)`.
///
/// Key sets are cached under `lfs:oidc:jwks:<provider>`. A cached set that
/// lacks the requested key is refetched, so issuer key rotation is picked up
/// before the cache entry expires. Such refetches happen at most once per
/// [`keys::JWKS_REFETCH_INTERVAL`]; unknown key ids inside that window are
/// rejected from the cached set.
pub struct JwksFetcher {
    http: reqwest::Client,
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl JwksFetcher {
    pub fn new(cache: Arc<dyn KvCache>, ttl: Duration) -> AuthResult<Self> {
        Ok(Self {
            http: build_client()?,
            cache,
            ttl: keys::ttl_or(ttl, keys::JWKS_TTL),
        })
    }

    /// Return the verification key `kid` published at `jwks_url`.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn key(&self, jwks_url: &str, kid: &str, provider: &str) -> AuthResult<DecodingKey> {
        let cache_key = keys::jwks_key(provider);

        match self.cache.get_json::<JwkSet>(&cache_key).await {
            Ok(set) => match set.find(kid) {
                Some(jwk) => return jwk.decoding_key(),
                None if self.refetch_held_off(provider).await => {
                    debug!(kid = %kid, "Key id not in cached JWKS, refetch held off");
                    return Err(AuthError::KeyIdNotFound(kid.to_string()));
                }
                None => debug!(kid = %kid, "Key id not in cached JWKS, refetching"),
            },
            Err(e) if e.is_miss() => {}
            Err(e) => warn!(error = %e, "JWKS cache read failed, fetching from issuer"),
        }

        let set = self.fetch(jwks_url).await?;
        if let Err(e) = self.cache.set_json(&cache_key, &set, self.ttl).await {
            warn!(error = %e, "Failed to cache JWKS");
        }

        set.find(kid)
            .ok_or_else(|| AuthError::KeyIdNotFound(kid.to_string()))?
            .decoding_key()
    }

    /// True when a refetch ran within the interval. Otherwise claims the
    /// window for the caller. A cache failure never holds a refetch off.
    async fn refetch_held_off(&self, provider: &str) -> bool {
        let marker = keys::jwks_refetch_key(provider);
        match self.cache.exists(&marker).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "JWKS refetch marker unreadable");
                return false;
            }
        }
        if let Err(e) = self
            .cache
            .set(&marker, "1", keys::JWKS_REFETCH_INTERVAL)
            .await
        {
            warn!(error = %e, "Failed to record JWKS refetch");
        }
        false
    }

    async fn fetch(&self, jwks_url: &str) -> AuthResult<JwkSet> {
        let response = self
            .http
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(AuthError::JwksFetchFailed(format!("issuer returned {status}")));
        }

        let body = read_capped(response, MAX_BODY_BYTES)
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;
        let set: JwkSet = serde_json::from_slice(&body)
            .map_err(|e| AuthError::JwksFetchFailed(format!("invalid JWKS document: {e}")))?;
        debug!(keys = set.keys.len(), "Fetched JWKS");
        Ok(set)
    }
}
