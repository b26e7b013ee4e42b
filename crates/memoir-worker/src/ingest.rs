//! Clip ingestion.
//!
//! After an upload is committed, the clip is processed in the background:
//! thumbnail, speech-to-text and tagging. [`IngestDispatcher`] runs each job
//! as a detached task and reports its outcome on a channel, so failures are
//! observable instead of disappearing inside the task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use memoir_media::{Transcoder, WorkingDirectory, Workspace};
use memoir_models::{ClipId, FileRole, IngestJob, IngestOutcome, ProcessingStatus};
use memoir_storage::{copy_to_file, upload_file, BlobStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::error::{IngestError, IngestResult};
use crate::logging::JobLogger;
use crate::metrics::record_ingest;

/// Sources smaller than this are rejected as broken uploads.
pub const MIN_SOURCE_BYTES: u64 = 1000;

/// Tag used when tagging yields nothing.
pub const FALLBACK_TAG: &str = "misc";

const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Speech-to-text over a WAV file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> IngestResult<String>;
}

/// Derives tags from a transcription.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Tagger: Send + Sync {
    async fn tag(&self, transcription: &str) -> IngestResult<Vec<String>>;
}

/// Processes one uploaded clip end to end.
pub struct IngestPipeline {
    store: Arc<dyn BlobStore>,
    transcoder: Arc<dyn Transcoder>,
    transcriber: Arc<dyn Transcriber>,
    tagger: Arc<dyn Tagger>,
    workspace: Workspace,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        transcoder: Arc<dyn Transcoder>,
        transcriber: Arc<dyn Transcriber>,
        tagger: Arc<dyn Tagger>,
        workspace: Workspace,
    ) -> Self {
        Self {
            store,
            transcoder,
            transcriber,
            tagger,
            workspace,
        }
    }

    /// Run the job in its own working directory, released on every path.
    pub async fn process(&self, job: &IngestJob) -> IngestResult<IngestOutcome> {
        let logger = JobLogger::for_clip(&job.clip_id, "ingest_clip");
        logger.log_start(format_args!("blob {} ({})", job.blob_id, job.original_name));

        let mut workdir = self
            .workspace
            .open(&format!("ingest-{}", short(&job.clip_id)))
            .await?;
        let result = self
            .run(job, &workdir, &logger)
            .instrument(logger.span())
            .await;
        workdir.close();

        match &result {
            Ok(outcome) => {
                record_ingest("success");
                logger.log_completion(format_args!("{} tags", outcome.tags.len()));
            }
            Err(e) => {
                record_ingest("error");
                logger.log_error(e);
            }
        }
        result
    }

    async fn run(
        &self,
        job: &IngestJob,
        workdir: &WorkingDirectory,
        logger: &JobLogger,
    ) -> IngestResult<IngestOutcome> {
        let source = workdir.track(&source_file_name(&job.original_name), FileRole::Raw);
        let reader = self.store.open_download(&job.blob_id).await?;
        let bytes = copy_to_file(reader, source.path()).await?;
        if bytes < MIN_SOURCE_BYTES {
            return Err(IngestError::invalid_source(format!(
                "source is {} bytes, expected at least {}",
                bytes, MIN_SOURCE_BYTES
            )));
        }

        let thumbnail_blob_id = match self.store_thumbnail(job, source.path(), workdir).await {
            Ok(id) => Some(id),
            Err(e) => {
                logger.log_warning(format_args!("thumbnail skipped: {}", e));
                None
            }
        };

        let audio = workdir.track("audio.wav", FileRole::Audio);
        let transcription = match self
            .transcoder
            .extract_audio(source.path(), audio.path())
            .await?
        {
            Some(path) => self.transcriber.transcribe(&path).await?,
            None => {
                logger.log_progress("no audio stream, skipping transcription");
                String::new()
            }
        };

        let mut tags = self.tagger.tag(&transcription).await?;
        if tags.is_empty() {
            logger.log_warning(format_args!("no tags extracted, using '{}'", FALLBACK_TAG));
            tags.push(FALLBACK_TAG.to_string());
        }

        Ok(IngestOutcome {
            clip_id: job.clip_id.clone(),
            transcription,
            tags,
            thumbnail_blob_id,
        })
    }

    async fn store_thumbnail(
        &self,
        job: &IngestJob,
        source: &Path,
        workdir: &WorkingDirectory,
    ) -> IngestResult<memoir_models::BlobId> {
        let thumbnail = workdir.track("thumbnail.png", FileRole::Thumbnail);
        self.transcoder.thumbnail(source, thumbnail.path()).await?;

        let name = format!("{}-thumbnail.png", job.clip_id);
        Ok(upload_file(self.store.as_ref(), thumbnail.path(), &name, "image/png").await?)
    }
}

/// Scratch name for the source, keeping its extension for format detection.
fn source_file_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp4");
    PathBuf::from("source")
        .with_extension(extension.to_ascii_lowercase())
        .to_string_lossy()
        .into_owned()
}

fn short(clip_id: &ClipId) -> &str {
    let id = clip_id.as_str();
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Outcome of a background ingestion job.
#[derive(Debug)]
pub enum IngestReport {
    Completed(IngestOutcome),
    Failed { clip_id: ClipId, error: IngestError },
}

impl IngestReport {
    pub fn clip_id(&self) -> &ClipId {
        match self {
            IngestReport::Completed(outcome) => &outcome.clip_id,
            IngestReport::Failed { clip_id, .. } => clip_id,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        match self {
            IngestReport::Completed(outcome) => outcome.status(),
            IngestReport::Failed { .. } => ProcessingStatus::Error,
        }
    }
}

/// Runs ingestion jobs as detached tasks.
#[derive(Clone)]
pub struct IngestDispatcher {
    pipeline: Arc<IngestPipeline>,
    reports: mpsc::Sender<IngestReport>,
}

impl IngestDispatcher {
    /// Create a dispatcher and the receiver its reports are sent to.
    pub fn new(pipeline: Arc<IngestPipeline>) -> (Self, mpsc::Receiver<IngestReport>) {
        let (reports, receiver) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        (Self { pipeline, reports }, receiver)
    }

    /// Start processing `job` without waiting for it.
    pub fn dispatch(&self, job: IngestJob) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            let report = match pipeline.process(&job).await {
                Ok(outcome) => {
                    info!(clip_id = %job.clip_id, "Ingestion completed");
                    IngestReport::Completed(outcome)
                }
                Err(error) => {
                    warn!(clip_id = %job.clip_id, error = %error, "Ingestion failed");
                    IngestReport::Failed {
                        clip_id: job.clip_id.clone(),
                        error,
                    }
                }
            };

            if reports.send(report).await.is_err() {
                warn!(clip_id = %job.clip_id, "Ingestion report dropped: receiver closed");
            }
        })
    }
}
