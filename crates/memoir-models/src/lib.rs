//! Shared data models for the Memoir backend.
//!
//! This crate provides Serde-serializable types for:
//! - Clip, blob and job identifiers
//! - Assembly requests and the trim plan derived from them
//! - Encoding policy for rendered stories
//! - Ingestion jobs and story records

pub mod assembly;
pub mod clip;
pub mod encoding;
pub mod ingest;
pub mod job;
pub mod story;

// Re-export common types
pub use assembly::{
    per_clip_seconds, AssemblyPlan, AssemblyRequest, AssemblyResult, FileRole, MIN_CLIP_SECONDS,
};
pub use clip::{BlobId, ClipId, ClipReference};
pub use encoding::EncodingConfig;
pub use ingest::{IngestJob, IngestOutcome, ProcessingStatus};
pub use job::JobId;
pub use story::{StoryDraft, StoryMetadata, StoryRequest, StoryType};
