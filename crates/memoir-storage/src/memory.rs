//! Process-local blob store.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use memoir_models::BlobId;
use tracing::debug;

use crate::blob::{BlobReader, BlobStore, BlobUpload};
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredBlob {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: HashMap<BlobId, StoredBlob>,
    /// Commit order
    order: Vec<BlobId>,
}

/// In-memory [`BlobStore`].
///
/// Clones share the same contents. Uploads are buffered in their handle and
/// inserted in one step on finish.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` directly and return its id.
    pub fn insert(&self, name: &str, content_type: &str, data: Vec<u8>) -> BlobId {
        let id = BlobId::new();
        let mut inner = self.lock();
        inner.blobs.insert(
            id.clone(),
            StoredBlob {
                name: name.to_string(),
                content_type: content_type.to_string(),
                data,
            },
        );
        inner.order.push(id.clone());
        id
    }

    pub fn contents(&self, id: &BlobId) -> Option<Vec<u8>> {
        self.lock().blobs.get(id).map(|b| b.data.clone())
    }

    pub fn content_type(&self, id: &BlobId) -> Option<String> {
        self.lock().blobs.get(id).map(|b| b.content_type.clone())
    }

    /// Names of stored blobs in commit order.
    pub fn upload_names(&self) -> Vec<String> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.blobs.get(id))
            .map(|b| b.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct MemoryUpload {
    store: MemoryBlobStore,
    name: String,
    content_type: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl BlobUpload for MemoryUpload {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<BlobId> {
        let MemoryUpload {
            store,
            name,
            content_type,
            buffer,
        } = *self;
        let id = store.insert(&name, &content_type, buffer);
        debug!(blob_id = %id, name, "Committed in-memory blob");
        Ok(id)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        debug!(name = %self.name, "Aborted in-memory upload");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn open_upload(
        &self,
        name: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn BlobUpload>> {
        Ok(Box::new(MemoryUpload {
            store: self.clone(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn open_download(&self, id: &BlobId) -> StorageResult<BlobReader> {
        let data = self
            .contents(id)
            .ok_or_else(|| StorageError::not_found(id.as_str()))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn exists(&self, id: &BlobId) -> StorageResult<bool> {
        Ok(self.lock().blobs.contains_key(id))
    }

    async fn delete(&self, id: &BlobId) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.blobs.remove(id);
        inner.order.retain(|existing| existing != id);
        Ok(())
    }
}
