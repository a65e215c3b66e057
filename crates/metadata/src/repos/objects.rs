//! LFS object repository trait.

use crate::error::MetadataResult;
use crate::models::LfsObjectRow;
use async_trait::async_trait;
use lfs_core::Oid;

/// Repository for LFS object rows.
#[async_trait]
pub trait ObjectRepo: Send + Sync {
    /// Get an object by OID.
    async fn find_object(&self, oid: &Oid) -> MetadataResult<Option<LfsObjectRow>>;

    /// Insert a new object. Fails with `AlreadyExists` on a duplicate OID.
    async fn create_object(&self, row: &LfsObjectRow) -> MetadataResult<()>;

    /// Update size and uploaded flag.
    ///
    /// Rejects `uploaded -> pending` and any change to the size or hash
    /// algorithm of an uploaded object.
    async fn update_object(&self, row: &LfsObjectRow) -> MetadataResult<()>;

    /// Check whether an object row exists.
    async fn object_exists(&self, oid: &Oid) -> MetadataResult<bool>;

    /// Transition `pending -> uploaded` with a single-row update.
    ///
    /// Idempotent: marking an uploaded object again returns it unchanged.
    async fn mark_uploaded(&self, oid: &Oid) -> MetadataResult<LfsObjectRow>;
}
