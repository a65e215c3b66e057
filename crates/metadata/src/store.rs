//! Metadata store trait.

use crate::error::MetadataResult;
use crate::models::LfsObjectRow;
use crate::repos::{AccessPolicyRepo, AllowlistRepo, ObjectRepo};
use async_trait::async_trait;
use lfs_core::{HashAlgo, Oid, RepositoryName};

/// Transaction isolation levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Whatever the server is configured with.
    #[default]
    Default,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Statement to issue first inside the transaction, if any.
    pub fn set_statement(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::ReadCommitted => Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
            Self::RepeatableRead => Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"),
            Self::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
        }
    }
}

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: ObjectRepo + AccessPolicyRepo + AllowlistRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Record an upload intent in one transaction.
    ///
    /// Ensures the object row exists (a pending row takes the new `size`;
    /// an uploaded row is left untouched) and binds the OID to `repo`.
    /// Returns the object row as stored.
    async fn prepare_upload(
        &self,
        oid: &Oid,
        size: i64,
        algo: HashAlgo,
        repo: &RepositoryName,
    ) -> MetadataResult<LfsObjectRow>;
}
