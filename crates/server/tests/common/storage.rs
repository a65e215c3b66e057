//! In-memory object store.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lfs_core::StorageKey;
use lfs_storage::{
    ObjectBody, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Objects = Arc<Mutex<HashMap<String, Bytes>>>;

/// Object store keeping committed objects in memory. Uploads become
/// visible only on `finish`.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Objects,
    aborted: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn get(&self, key: &StorageKey) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key.as_str()).cloned()
    }

    pub fn insert(&self, key: &StorageKey, data: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.into());
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }
}

struct MemoryUpload {
    objects: Objects,
    aborted: Arc<AtomicUsize>,
    key: String,
    data: Vec<u8>,
}

#[async_trait]
impl StreamingUpload for MemoryUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.data.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let len = self.data.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(self.key, Bytes::from(self.data));
        Ok(len)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(&self, key: &StorageKey, _ttl: Duration) -> StorageResult<String> {
        Ok(format!("https://bucket.s3.amazonaws.com/{key}?X-Amz-Signature=put"))
    }

    async fn presign_get(&self, key: &StorageKey, _ttl: Duration) -> StorageResult<String> {
        Ok(format!("https://bucket.s3.amazonaws.com/{key}?X-Amz-Signature=get"))
    }

    async fn head(&self, key: &StorageKey) -> StorageResult<ObjectMeta> {
        let data = self
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMeta {
            size: data.len() as u64,
            last_modified: None,
            content_type: None,
        })
    }

    async fn get_stream(&self, key: &StorageKey) -> StorageResult<ObjectBody> {
        let data = self
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let size = data.len() as u64;
        // Two chunks so the response is genuinely streamed.
        let mid = data.len() / 2;
        let chunks = vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))];
        Ok(ObjectBody {
            stream: Box::pin(futures::stream::iter(chunks)),
            size,
        })
    }

    async fn put_stream(&self, key: &StorageKey) -> StorageResult<Box<dyn StreamingUpload>> {
        Ok(Box::new(MemoryUpload {
            objects: self.objects.clone(),
            aborted: self.aborted.clone(),
            key: key.to_string(),
            data: Vec::new(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
