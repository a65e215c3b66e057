//! Object store gateway for the Git LFS proxy.
//!
//! This crate provides:
//! - The [`ObjectStore`] abstraction keyed by [`lfs_core::StorageKey`]
//! - Presigned upload and download URLs for internal use
//! - Size- and digest-checked streaming uploads via [`ObjectStoreExt`]
//! - An S3-compatible backend

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::s3::S3Backend;
pub use error::{StorageError, StorageResult};
pub use traits::{
    ByteStream, ObjectBody, ObjectMeta, ObjectStore, ObjectStoreExt, StreamingUpload,
};

use lfs_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;
    let backend = S3Backend::from_config(config)?;
    tracing::info!(
        bucket = %backend.bucket(),
        endpoint = config.endpoint.as_deref().unwrap_or("aws"),
        "Object store configured"
    );
    Ok(Arc::new(backend))
}
