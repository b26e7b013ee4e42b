//! Story assembly and clip ingestion worker.
//!
//! This crate provides:
//! - The clip assembly engine (download, trim, concatenate, upload)
//! - Story composition with non-fatal rendering
//! - Clip ingestion as detached background tasks
//! - Speech-to-text and keyword tagging collaborators
//! - Job logging and Prometheus metrics

pub mod assembly;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod story;
pub mod tagging;
pub mod transcription;

pub use assembly::{assemble_story, ClipAssembler};
pub use config::AssemblyConfig;
pub use error::{AssemblyError, IngestError, IngestResult, NarrationError};
pub use ingest::{IngestDispatcher, IngestPipeline, IngestReport, Tagger, Transcriber};
pub use logging::JobLogger;
pub use story::{Narrator, StoryComposer, NARRATIVE_FALLBACK};
pub use tagging::KeywordTagger;
pub use transcription::{TranscriptionConfig, WhisperTranscriber};
