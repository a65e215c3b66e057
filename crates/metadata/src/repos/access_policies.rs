//! Access policy repository trait.

use crate::error::MetadataResult;
use crate::models::AccessPolicyRow;
use async_trait::async_trait;
use lfs_core::{Oid, RepositoryName};

/// Repository for OID to repository bindings.
#[async_trait]
pub trait AccessPolicyRepo: Send + Sync {
    /// Get the policy for an OID.
    async fn find_access_policy(&self, oid: &Oid) -> MetadataResult<Option<AccessPolicyRow>>;

    /// Upsert the policy for an OID. An existing row is rebound to `repo`.
    async fn save_access_policy(
        &self,
        oid: &Oid,
        repo: &RepositoryName,
    ) -> MetadataResult<AccessPolicyRow>;

    /// Delete the policy for an OID. Returns `NotFound` if none existed.
    async fn delete_access_policy(&self, oid: &Oid) -> MetadataResult<()>;
}
