//! Database models mapping to the metadata schema.

use lfs_core::{HashAlgo, Oid, RepositoryName, StorageKey};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// One LFS object. `storage_key` is always derived from `(hash_algo, oid)`.
///
/// Also the JSON shape cached under `lfs:meta:<oid>`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LfsObjectRow {
    pub oid: String,
    pub size: i64,
    pub hash_algo: String,
    pub storage_key: String,
    pub uploaded: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl LfsObjectRow {
    /// A new pending object with its derived storage key.
    pub fn pending(oid: &Oid, size: i64, algo: HashAlgo) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            oid: oid.to_string(),
            size,
            hash_algo: algo.as_str().to_string(),
            storage_key: StorageKey::derive(algo, oid).to_string(),
            uploaded: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn oid(&self) -> lfs_core::Result<Oid> {
        Oid::parse(&self.oid)
    }

    pub fn hash_algo(&self) -> lfs_core::Result<HashAlgo> {
        HashAlgo::parse(&self.hash_algo)
    }

    /// Size in bytes. Rows never hold negative sizes.
    pub fn size_bytes(&self) -> u64 {
        u64::try_from(self.size).unwrap_or(0)
    }
}

/// Upload provenance: the repository that owns download access to an OID.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AccessPolicyRow {
    pub id: i32,
    pub lfs_object_oid: String,
    pub repository: String,
    pub created_at: OffsetDateTime,
}

impl AccessPolicyRow {
    /// Whether this policy grants access to `repo`.
    pub fn allows(&self, repo: &RepositoryName) -> bool {
        self.repository == repo.full_name()
    }
}

/// A repository this deployment serves.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AllowlistRow {
    pub id: i32,
    pub repository: String,
    pub created_at: OffsetDateTime,
}
