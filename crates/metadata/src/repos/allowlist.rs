//! Repository allowlist trait.

use crate::error::MetadataResult;
use crate::models::AllowlistRow;
use async_trait::async_trait;
use lfs_core::RepositoryName;

#[async_trait]
pub trait AllowlistRepo: Send + Sync {
    async fn is_repository_allowed(&self, repo: &RepositoryName) -> MetadataResult<bool>;

    /// Returns `false` when the repository was already present.
    async fn add_repository(&self, repo: &RepositoryName) -> MetadataResult<bool>;

    /// Returns `NotFound` when the repository was not present.
    async fn remove_repository(&self, repo: &RepositoryName) -> MetadataResult<()>;

    /// All entries, ordered by repository name.
    async fn list_repositories(&self) -> MetadataResult<Vec<AllowlistRow>>;
}
