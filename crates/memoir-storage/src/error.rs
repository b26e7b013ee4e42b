//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob store failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob store misconfigured: {0}")]
    ConfigError(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    /// Local file I/O around a transfer (scratch space, not the store)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store itself could not be reached or answered with an error
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether the failure happened on the local filesystem side of a transfer.
    pub fn is_local(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}
