//! Structured job logging.
//!
//! Every assembly and ingestion job logs through a [`JobLogger`] so its
//! events share the same `job_id`/`operation` fields and can be filtered
//! together.

use std::fmt::Display;

use memoir_models::{ClipId, JobId};
use tracing::{debug, error, info, warn, Span};

/// Logger bound to one job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    /// Logger for a job keyed by a clip rather than a generated job id.
    pub fn for_clip(clip_id: &ClipId, operation: &'static str) -> Self {
        Self {
            job_id: clip_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: impl Display) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: impl Display) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    /// Per-clip detail, at debug level.
    pub fn log_clip(&self, index: usize, clip_id: &ClipId, message: impl Display) {
        debug!(
            job_id = %self.job_id,
            operation = self.operation,
            index,
            clip_id = %clip_id,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: impl Display) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: impl Display) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, message: impl Display) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Span covering the whole job.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "assemble_story");

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.operation(), "assemble_story");
    }

    #[test]
    fn test_clip_logger_uses_clip_id() {
        let logger = JobLogger::for_clip(&ClipId::from("clip-42"), "ingest_clip");
        assert_eq!(logger.job_id(), "clip-42");
    }
}
