//! Ingestion handoff models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BlobId, ClipId};

/// Processing status of an uploaded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Original is still being written to the blob store
    #[default]
    Uploading,
    /// Transcription and tagging in progress
    Processing,
    /// Transcription and tagging finished
    Completed,
    /// Post-upload processing failed
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Uploading => "uploading",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Error)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Post-upload processing request for a freshly stored original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IngestJob {
    /// Clip record being processed
    pub clip_id: ClipId,
    /// Blob holding the uploaded original
    pub blob_id: BlobId,
    /// Filename as uploaded by the user
    pub original_name: String,
}

/// Result of post-upload processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IngestOutcome {
    pub clip_id: ClipId,
    /// Transcript text; empty when the clip has no audio
    pub transcription: String,
    /// Tags derived from the transcript, never empty
    pub tags: Vec<String>,
    /// Stored preview frame, when one could be extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_blob_id: Option<BlobId>,
}

impl IngestOutcome {
    /// Status to record on the clip once this outcome is persisted.
    pub fn status(&self) -> ProcessingStatus {
        ProcessingStatus::Completed
    }
}
