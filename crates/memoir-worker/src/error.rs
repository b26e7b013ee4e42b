//! Worker error types.

use memoir_media::MediaError;
use memoir_models::{BlobId, ClipId};
use memoir_storage::StorageError;
use thiserror::Error;

/// Failure of a story assembly.
///
/// Every lower-level error is converted into one of these four kinds before
/// it reaches the caller.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Invalid assembly request: {0}")]
    InvalidRequest(String),

    #[error("Clip {clip_id} not found: blob {blob_id} does not exist")]
    ClipNotFound { clip_id: ClipId, blob_id: BlobId },

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AssemblyError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Map a failure to open a clip's blob.
    pub fn from_clip_download(clip_id: &ClipId, blob_id: &BlobId, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::ClipNotFound {
                clip_id: clip_id.clone(),
                blob_id: blob_id.clone(),
            },
            other => other.into(),
        }
    }

    /// Metric label for this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AssemblyError::InvalidRequest(_) => "invalid_request",
            AssemblyError::ClipNotFound { .. } => "clip_not_found",
            AssemblyError::Transcode(_) => "transcode",
            AssemblyError::Storage(_) => "storage",
        }
    }
}

impl From<MediaError> for AssemblyError {
    fn from(err: MediaError) -> Self {
        match err.stderr() {
            Some(stderr) => Self::Transcode(format!("{}: {}", err, stderr)),
            None => Self::Transcode(err.to_string()),
        }
    }
}

impl From<StorageError> for AssemblyError {
    /// Local filesystem failures around a transfer are scratch-space
    /// problems and count as transcode failures.
    fn from(err: StorageError) -> Self {
        if err.is_local() {
            Self::Transcode(format!("Scratch space error: {}", err))
        } else {
            Self::Storage(err.to_string())
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure of a clip ingestion job.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid source media: {0}")]
    InvalidSource(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Tagging failed: {0}")]
    TaggingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    pub fn transcription_failed(msg: impl Into<String>) -> Self {
        Self::TranscriptionFailed(msg.into())
    }

    pub fn tagging_failed(msg: impl Into<String>) -> Self {
        Self::TaggingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if re-running the job could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::TranscriptionFailed(_) | IngestError::TaggingFailed(_)
        ) || matches!(self, IngestError::Storage(e) if !matches!(e, StorageError::NotFound(_)))
    }
}

/// Narrative generation failed.
#[derive(Debug, Error)]
#[error("Narrative generation failed: {0}")]
pub struct NarrationError(pub String);
