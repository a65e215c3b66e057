//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use lfs_core::StorageKey;
use sha2::{Digest, Sha256};
use std::pin::Pin;
use std::time::Duration;

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store gateway for LFS objects.
///
/// Presigned URLs are minted for internal use only; clients always talk to
/// the proxy.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Mint a time-limited URL for uploading `key`.
    async fn presign_put(&self, key: &StorageKey, ttl: Duration) -> StorageResult<String>;

    /// Mint a time-limited URL for downloading `key`.
    async fn presign_get(&self, key: &StorageKey, ttl: Duration) -> StorageResult<String>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &StorageKey) -> StorageResult<ObjectMeta>;

    /// Get an object as a byte stream together with its size.
    async fn get_stream(&self, key: &StorageKey) -> StorageResult<ObjectBody>;

    /// Start a streaming upload.
    ///
    /// Dropping the returned upload without calling `finish` discards it.
    async fn put_stream(&self, key: &StorageKey) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Get the name of this storage backend (for metrics and logging).
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// A streamed object body.
pub struct ObjectBody {
    pub stream: ByteStream,
    pub size: u64,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Integrity-checked uploads, provided for every [`ObjectStore`].
///
/// DO NOT IMPLEMENT THIS TRAIT MANUALLY. It is automatically provided via a blanket
/// implementation for all types that implement ObjectStore.
#[async_trait]
pub trait ObjectStoreExt: ObjectStore {
    /// Stream `body` into `key`, enforcing the declared size and, when
    /// given, the SHA-256 digest.
    ///
    /// `size` is authoritative: a body that runs past it is rejected as soon
    /// as the excess arrives. Any failure aborts the upload so nothing
    /// becomes visible under `key`. Returns the bytes written.
    async fn stream_put(
        &self,
        key: &StorageKey,
        mut body: ByteStream,
        size: u64,
        digest: Option<[u8; 32]>,
    ) -> StorageResult<u64> {
        let mut upload = self.put_stream(key).await?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(abort_with(upload, e).await),
            };
            written += chunk.len() as u64;
            if written > size {
                let err = StorageError::SizeMismatch {
                    expected: size,
                    actual: written,
                };
                return Err(abort_with(upload, err).await);
            }
            hasher.update(&chunk);
            if let Err(e) = upload.write(chunk).await {
                return Err(abort_with(upload, e).await);
            }
        }

        if written != size {
            let err = StorageError::SizeMismatch {
                expected: size,
                actual: written,
            };
            return Err(abort_with(upload, err).await);
        }

        if let Some(expected) = digest {
            let actual: [u8; 32] = hasher.finalize().into();
            if actual != expected {
                let err = StorageError::HashMismatch {
                    expected: hex::encode(expected),
                    actual: hex::encode(actual),
                };
                return Err(abort_with(upload, err).await);
            }
        }

        upload.finish().await
    }
}

impl<T: ObjectStore + ?Sized> ObjectStoreExt for T {}

async fn abort_with(upload: Box<dyn StreamingUpload>, err: StorageError) -> StorageError {
    if let Err(abort_err) = upload.abort().await {
        tracing::warn!(error = %abort_err, "Failed to abort upload");
    }
    err
}
