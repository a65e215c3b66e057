//! Signed proxy URLs.
//!
//! Action URLs point back at this server and carry `expires` and
//! `signature` query parameters. The signature is HMAC-SHA256 over
//! `operation \n owner/name \n oid \n expires`, so a URL minted for one
//! object, repository or operation cannot be replayed against another.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use lfs_core::config::ServerConfig;
use lfs_core::{Oid, RepositoryName};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Operation a proxy URL is valid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyOperation {
    Upload,
    Download,
    Verify,
}

impl ProxyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Verify => "verify",
        }
    }
}

/// Why a signed URL was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("proxy URL has expired")]
    Expired,
    #[error("proxy URL signature is invalid")]
    Invalid,
}

/// A minted proxy URL.
#[derive(Clone, Debug)]
pub struct SignedUrl {
    pub href: String,
    /// Seconds until expiry.
    pub expires_in: i64,
}

/// Mints and checks proxy URLs rooted at the public base URL.
#[derive(Clone)]
pub struct ProxyUrlSigner {
    mac: HmacSha256,
    base_url: Arc<str>,
    ttl: Duration,
}

impl ProxyUrlSigner {
    pub fn new(key: &[u8], base_url: &str, ttl: Duration) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key)?,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            ttl,
        })
    }

    /// Build from server configuration. Without a configured key a random
    /// one is generated, so URLs die with the process.
    pub fn from_config(config: &ServerConfig) -> Result<Self, InvalidLength> {
        match &config.url_signing_key {
            Some(key) => Self::new(
                key.expose().as_bytes(),
                config.public_base(),
                config.proxy_url_ttl(),
            ),
            None => {
                tracing::warn!(
                    "No url_signing_key configured; generated an ephemeral key. \
                     Proxy URLs will not survive restarts or work across replicas"
                );
                let mut key = [0u8; 32];
                rand::rng().fill_bytes(&mut key);
                Self::new(&key, config.public_base(), config.proxy_url_ttl())
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base>/<owner>/<name>/info/lfs`
    pub fn lfs_url(&self, repo: &RepositoryName) -> String {
        format!(
            "{}/{}/{}/info/lfs",
            self.base_url,
            utf8_percent_encode(repo.owner(), PATH_SEGMENT),
            utf8_percent_encode(repo.name(), PATH_SEGMENT)
        )
    }

    /// Mint a URL for `op`. Verify URLs carry no OID.
    pub fn sign_url(
        &self,
        op: ProxyOperation,
        repo: &RepositoryName,
        oid: Option<&Oid>,
        now: OffsetDateTime,
    ) -> SignedUrl {
        let expires_in = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        let expires = now.unix_timestamp().saturating_add(expires_in);
        let signature = self.signature(op, repo, oid, expires);

        let target = match (op, oid) {
            (ProxyOperation::Verify, _) | (_, None) => "verify".to_string(),
            (_, Some(oid)) => oid.to_string(),
        };
        SignedUrl {
            href: format!(
                "{}/objects/{target}?expires={expires}&signature={signature}",
                self.lfs_url(repo)
            ),
            expires_in,
        }
    }

    /// Check a presented signature.
    pub fn verify(
        &self,
        op: ProxyOperation,
        repo: &RepositoryName,
        oid: Option<&Oid>,
        expires: i64,
        signature: &str,
        now: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        let presented = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        self.mac(op, repo, oid, expires)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Invalid)?;
        if expires <= now.unix_timestamp() {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    fn signature(
        &self,
        op: ProxyOperation,
        repo: &RepositoryName,
        oid: Option<&Oid>,
        expires: i64,
    ) -> String {
        hex::encode(self.mac(op, repo, oid, expires).finalize().into_bytes())
    }

    fn mac(
        &self,
        op: ProxyOperation,
        repo: &RepositoryName,
        oid: Option<&Oid>,
        expires: i64,
    ) -> HmacSha256 {
        let mut mac = self.mac.clone();
        let oid = oid.map(Oid::as_str).unwrap_or("");
        mac.update(
            format!("{}\n{}\n{oid}\n{expires}", op.as_str(), repo.full_name()).as_bytes(),
        );
        mac
    }
}

impl std::fmt::Debug for ProxyUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyUrlSigner")
            .field("base_url", &self.base_url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
