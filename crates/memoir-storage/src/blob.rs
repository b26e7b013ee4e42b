//! The blob store capability and transfer helpers.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use memoir_models::BlobId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Chunk size for file transfers.
const TRANSFER_CHUNK_BYTES: usize = 1024 * 1024;

/// Readable byte stream of a stored blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// An in-progress upload.
///
/// Nothing written through the handle is visible to readers until
/// [`BlobUpload::finish`] returns; an aborted or dropped upload leaves no blob.
#[async_trait]
pub trait BlobUpload: Send {
    /// Append a chunk.
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()>;

    /// Commit the blob and return its generated id.
    async fn finish(self: Box<Self>) -> StorageResult<BlobId>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Durable content store keyed by generated ids.
///
/// Safe for concurrent reads and writes of distinct ids.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Start an upload. `name` is descriptive metadata, not the id.
    async fn open_upload(&self, name: &str, content_type: &str)
        -> StorageResult<Box<dyn BlobUpload>>;

    /// Open a stored blob for reading. Fails with [`StorageError::NotFound`]
    /// when `id` does not resolve.
    async fn open_download(&self, id: &BlobId) -> StorageResult<BlobReader>;

    async fn exists(&self, id: &BlobId) -> StorageResult<bool>;

    async fn delete(&self, id: &BlobId) -> StorageResult<()>;
}

/// Copy a blob stream into a new local file, returning the byte count.
///
/// Resolves once the file is fully written and flushed. Read failures are
/// reported as [`StorageError::DownloadFailed`], write failures as
/// [`StorageError::Io`].
pub async fn copy_to_file(mut reader: BlobReader, path: impl AsRef<Path>) -> StorageResult<u64> {
    let path = path.as_ref();
    let mut file = tokio::fs::File::create(path).await?;
    let mut buf = vec![0u8; TRANSFER_CHUNK_BYTES];
    let mut total = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    debug!(path = %path.display(), bytes = total, "Blob copied to file");
    Ok(total)
}

/// Stream a local file into the store under `name`.
///
/// The upload only commits after the whole file was written; any failure
/// aborts it so no partial blob is left behind.
pub async fn upload_file(
    store: &dyn BlobStore,
    path: impl AsRef<Path>,
    name: &str,
    content_type: &str,
) -> StorageResult<BlobId> {
    let path = path.as_ref();
    let mut file = tokio::fs::File::open(path).await?;
    let mut upload = store.open_upload(name, content_type).await?;

    match write_all_chunks(&mut file, upload.as_mut()).await {
        Ok(bytes) => {
            let id = upload.finish().await?;
            info!(path = %path.display(), blob_id = %id, bytes, name, "Uploaded file");
            Ok(id)
        }
        Err(e) => {
            if let Err(abort_err) = upload.abort().await {
                warn!(name, error = %abort_err, "Failed to abort upload");
            }
            Err(e)
        }
    }
}

async fn write_all_chunks(
    file: &mut tokio::fs::File,
    upload: &mut dyn BlobUpload,
) -> StorageResult<u64> {
    let mut buf = vec![0u8; TRANSFER_CHUNK_BYTES];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        upload.write(&buf[..n]).await?;
        total += n as u64;
    }
}
