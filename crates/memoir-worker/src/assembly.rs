//! Clip assembly engine.
//!
//! Turns an ordered list of stored clips into one rendered story video:
//!
//! 1. open a job-exclusive working directory
//! 2. download every clip (and, with a target duration, trim it)
//! 3. write a concat manifest in request order
//! 4. concatenate, by stream copy or by re-encoding with an output cap
//! 5. upload the finished file as a new blob
//!
//! The working directory is released on every exit path before the result
//! is returned. Per-clip work runs with bounded parallelism, but each result
//! lands in the slot of its request index, so completion order never changes
//! the manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use memoir_media::{ConcatManifest, ConcatOptions, FfmpegTranscoder, Transcoder, WorkingDirectory, Workspace};
use memoir_models::{
    AssemblyPlan, AssemblyRequest, AssemblyResult, ClipReference, EncodingConfig, FileRole, JobId,
};
use memoir_storage::{copy_to_file, upload_file, BlobStore};
use tracing::Instrument;

use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::logging::JobLogger;
use crate::metrics::record_assembly;

const MANIFEST_FILE: &str = "inputs.txt";
const OUTPUT_FILE: &str = "story.mp4";
const OUTPUT_CONTENT_TYPE: &str = "video/mp4";

/// Renders assembly requests against a blob store and a transcoder.
///
/// Holds no per-job state; one assembler serves concurrent jobs.
#[derive(Clone)]
pub struct ClipAssembler {
    store: Arc<dyn BlobStore>,
    transcoder: Arc<dyn Transcoder>,
    workspace: Workspace,
    config: AssemblyConfig,
}

impl ClipAssembler {
    pub fn new(
        store: Arc<dyn BlobStore>,
        transcoder: Arc<dyn Transcoder>,
        config: AssemblyConfig,
    ) -> Self {
        Self {
            store,
            transcoder,
            workspace: config.workspace(),
            config,
        }
    }

    /// Assembler using FFmpeg with the fixed story re-encode policy.
    pub fn with_ffmpeg(store: Arc<dyn BlobStore>, config: AssemblyConfig) -> Self {
        let transcoder = FfmpegTranscoder::new(EncodingConfig::story_reencode())
            .with_timeout(config.ffmpeg_timeout.as_secs());
        Self::new(store, Arc::new(transcoder), config)
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Render `request` into a new blob.
    ///
    /// Invalid requests are rejected before any scratch space is created.
    /// Nothing is uploaded unless the concatenated file was fully produced.
    pub async fn assemble(&self, request: &AssemblyRequest) -> Result<AssemblyResult, AssemblyError> {
        request.validate().map_err(AssemblyError::InvalidRequest)?;

        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "assemble_story");
        let plan = request.plan();
        let started = Instant::now();

        logger.log_start(format_args!(
            "{} clips, mode={}",
            request.clip_count(),
            plan
        ));

        let result = self
            .run_job(&job_id, request, &plan, &logger)
            .instrument(logger.span())
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(output) => {
                record_assembly("success", plan.as_str(), elapsed);
                logger.log_completion(format_args!(
                    "blob {} in {:.1}s",
                    output.output_blob_id, elapsed
                ));
            }
            Err(e) => {
                record_assembly(e.kind(), plan.as_str(), elapsed);
                logger.log_error(e);
            }
        }

        result
    }

    /// Run one job inside its own working directory.
    async fn run_job(
        &self,
        job_id: &JobId,
        request: &AssemblyRequest,
        plan: &AssemblyPlan,
        logger: &JobLogger,
    ) -> Result<AssemblyResult, AssemblyError> {
        let mut workdir = self
            .workspace
            .open(&format!("story-{}", job_id.short()))
            .await
            .map_err(|e| AssemblyError::transcode(format!("Failed to create working directory: {}", e)))?;

        let result = self.render(request, plan, &workdir, logger).await;

        workdir.close();
        result
    }

    async fn render(
        &self,
        request: &AssemblyRequest,
        plan: &AssemblyPlan,
        workdir: &WorkingDirectory,
        logger: &JobLogger,
    ) -> Result<AssemblyResult, AssemblyError> {
        let inputs = self.prepare_clips(request, plan, workdir, logger).await?;
        logger.log_progress(format_args!("{} clips prepared", inputs.len()));

        let manifest_file = workdir.track(MANIFEST_FILE, FileRole::Manifest);
        ConcatManifest::from_paths(inputs)
            .write_to(manifest_file.path())
            .await
            .map_err(|e| AssemblyError::transcode(format!("Failed to write concat manifest: {}", e)))?;

        let options = match plan {
            AssemblyPlan::Untrimmed => ConcatOptions::stream_copy(),
            AssemblyPlan::Trimmed {
                max_output_seconds, ..
            } => ConcatOptions::reencode(Some(*max_output_seconds)),
        };

        let output = workdir.track(OUTPUT_FILE, FileRole::Output);
        self.transcoder
            .concatenate(manifest_file.path(), output.path(), &options)
            .await?;
        logger.log_progress("concatenation finished");

        let name = format!(
            "{}-{}.mp4",
            self.config.output_prefix,
            Utc::now().timestamp_millis()
        );
        let output_blob_id =
            upload_file(self.store.as_ref(), output.path(), &name, OUTPUT_CONTENT_TYPE).await?;

        Ok(AssemblyResult { output_blob_id })
    }

    /// Download (and trim) every clip, returning the concat inputs in request order.
    async fn prepare_clips(
        &self,
        request: &AssemblyRequest,
        plan: &AssemblyPlan,
        workdir: &WorkingDirectory,
        logger: &JobLogger,
    ) -> Result<Vec<PathBuf>, AssemblyError> {
        let mut slots: Vec<Option<PathBuf>> = vec![None; request.clip_count()];

        let mut prepared = stream::iter(request.clips.iter().enumerate())
            .map(|(index, clip)| self.prepare_clip(index, clip, plan, workdir, logger))
            .buffer_unordered(self.config.clip_parallelism.max(1));

        // First failure wins; dropping the stream cancels in-flight clips.
        while let Some(result) = prepared.next().await {
            let (index, path) = result?;
            slots[index] = Some(path);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AssemblyError::transcode("Clip preparation finished with missing inputs"))
    }

    async fn prepare_clip(
        &self,
        index: usize,
        clip: &ClipReference,
        plan: &AssemblyPlan,
        workdir: &WorkingDirectory,
        logger: &JobLogger,
    ) -> Result<(usize, PathBuf), AssemblyError> {
        let raw = workdir.track(&format!("{:03}-raw.mp4", index), FileRole::Raw);

        let reader = self
            .store
            .open_download(&clip.blob_id)
            .await
            .map_err(|e| AssemblyError::from_clip_download(&clip.id, &clip.blob_id, e))?;
        let bytes = copy_to_file(reader, raw.path()).await?;
        logger.log_clip(index, &clip.id, format_args!("downloaded {} bytes", bytes));

        match plan {
            AssemblyPlan::Untrimmed => Ok((index, raw.path().to_path_buf())),
            AssemblyPlan::Trimmed {
                per_clip_seconds, ..
            } => {
                let trimmed = workdir.track(&format!("{:03}-trimmed.mp4", index), FileRole::Trimmed);
                self.transcoder
                    .trim(raw.path(), trimmed.path(), 0.0, *per_clip_seconds)
                    .await?;
                logger.log_clip(index, &clip.id, format_args!("trimmed to {}s", per_clip_seconds));
                Ok((index, trimmed.path().to_path_buf()))
            }
        }
    }
}

/// Caller-facing entry point: render `clips` in order, optionally fitted to
/// `target_duration_seconds`, and return the new blob id.
pub async fn assemble_story(
    assembler: &ClipAssembler,
    clips: Vec<ClipReference>,
    target_duration_seconds: Option<f64>,
) -> Result<AssemblyResult, AssemblyError> {
    let request = AssemblyRequest {
        clips,
        target_duration_seconds,
    };
    assembler.assemble(&request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memoir_media::{MediaError, MediaResult};
    use memoir_models::{BlobId, ClipId};
    use memoir_storage::{BlobReader, BlobUpload, MemoryBlobStore, StorageError, StorageResult};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Trim {
            input: PathBuf,
            start: f64,
            duration: f64,
        },
        Concat {
            entries: Vec<PathBuf>,
            options: ConcatOptions,
        },
    }

    /// Deterministic transcoder: a trim wraps its input bytes, a concat
    /// joins the manifest entries' bytes in listed order.
    #[derive(Default)]
    struct RecordingTranscoder {
        calls: Mutex<Vec<Call>>,
        fail_trim_of: Option<usize>,
        fail_concat: bool,
        /// Delay trims so later clips finish first
        stagger: bool,
    }

    impl RecordingTranscoder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn trims(&self) -> Vec<(PathBuf, f64, f64)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Trim {
                        input,
                        start,
                        duration,
                    } => Some((input, start, duration)),
                    _ => None,
                })
                .collect()
        }

        fn concat(&self) -> (Vec<PathBuf>, ConcatOptions) {
            self.calls()
                .into_iter()
                .find_map(|c| match c {
                    Call::Concat { entries, options } => Some((entries, options)),
                    _ => None,
                })
                .expect("concatenate was not called")
        }
    }

    fn clip_index(path: &Path) -> usize {
        path.file_name().unwrap().to_string_lossy()[..3].parse().unwrap()
    }

    #[async_trait]
    impl Transcoder for RecordingTranscoder {
        async fn trim(
            &self,
            input: &Path,
            output: &Path,
            start_secs: f64,
            duration_secs: f64,
        ) -> MediaResult<PathBuf> {
            let index = clip_index(input);
            if self.stagger {
                tokio::time::sleep(Duration::from_millis(10 * (10 - index as u64 % 10))).await;
            }
            self.calls.lock().unwrap().push(Call::Trim {
                input: input.to_path_buf(),
                start: start_secs,
                duration: duration_secs,
            });
            if self.fail_trim_of == Some(index) {
                return Err(MediaError::ffmpeg_failed("trim failed", None, Some(1)));
            }

            let mut data = b"[".to_vec();
            data.extend(tokio::fs::read(input).await?);
            data.extend(b"]");
            tokio::fs::write(output, data).await?;
            Ok(output.to_path_buf())
        }

        async fn extract_audio(&self, _input: &Path, _output: &Path) -> MediaResult<Option<PathBuf>> {
            Ok(None)
        }

        async fn concatenate(
            &self,
            manifest: &Path,
            output: &Path,
            options: &ConcatOptions,
        ) -> MediaResult<PathBuf> {
            let listing = tokio::fs::read_to_string(manifest).await?;
            let entries: Vec<PathBuf> = listing
                .lines()
                .map(|l| PathBuf::from(l.strip_prefix("file '").unwrap().strip_suffix('\'').unwrap()))
                .collect();
            self.calls.lock().unwrap().push(Call::Concat {
                entries: entries.clone(),
                options: *options,
            });
            if self.fail_concat {
                tokio::fs::write(output, b"half-written").await?;
                return Err(MediaError::ffmpeg_failed("concat failed", None, Some(1)));
            }

            let mut data = Vec::new();
            for entry in &entries {
                data.extend(tokio::fs::read(entry).await?);
            }
            tokio::fs::write(output, data).await?;
            Ok(output.to_path_buf())
        }

        async fn thumbnail(&self, _input: &Path, output: &Path) -> MediaResult<PathBuf> {
            Ok(output.to_path_buf())
        }
    }

    /// Memory store that fails selected operations.
    struct FlakyStore {
        inner: MemoryBlobStore,
        fail_download_of: Option<BlobId>,
        fail_uploads: bool,
    }

    struct FailingUpload;

    #[async_trait]
    impl BlobUpload for FailingUpload {
        async fn write(&mut self, _chunk: &[u8]) -> StorageResult<()> {
            Err(StorageError::upload_failed("quota exceeded"))
        }

        async fn finish(self: Box<Self>) -> StorageResult<BlobId> {
            Err(StorageError::upload_failed("quota exceeded"))
        }

        async fn abort(self: Box<Self>) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BlobStore for FlakyStore {
        async fn open_upload(
            &self,
            name: &str,
            content_type: &str,
        ) -> StorageResult<Box<dyn BlobUpload>> {
            if self.fail_uploads {
                return Ok(Box::new(FailingUpload));
            }
            self.inner.open_upload(name, content_type).await
        }

        async fn open_download(&self, id: &BlobId) -> StorageResult<BlobReader> {
            if self.fail_download_of.as_ref() == Some(id) {
                return Err(StorageError::download_failed("connection reset"));
            }
            self.inner.open_download(id).await
        }

        async fn exists(&self, id: &BlobId) -> StorageResult<bool> {
            self.inner.exists(id).await
        }

        async fn delete(&self, id: &BlobId) -> StorageResult<()> {
            self.inner.delete(id).await
        }
    }

    struct Harness {
        store: MemoryBlobStore,
        transcoder: Arc<RecordingTranscoder>,
        assembler: ClipAssembler,
        work_root: TempDir,
    }

    impl Harness {
        fn new(transcoder: RecordingTranscoder) -> Self {
            Self::with_store(MemoryBlobStore::new(), transcoder, |s| Arc::new(s) as Arc<dyn BlobStore>)
        }

        fn with_store(
            store: MemoryBlobStore,
            transcoder: RecordingTranscoder,
            wrap: impl FnOnce(MemoryBlobStore) -> Arc<dyn BlobStore>,
        ) -> Self {
            let work_root = tempfile::tempdir().unwrap();
            let transcoder = Arc::new(transcoder);
            let config = AssemblyConfig::default()
                .with_work_dir(work_root.path())
                .with_clip_parallelism(4);
            let assembler = ClipAssembler::new(wrap(store.clone()), transcoder.clone(), config);
            Self {
                store,
                transcoder,
                assembler,
                work_root,
            }
        }

        fn clip(&self, name: &str) -> ClipReference {
            let blob_id = self.store.insert(name, "video/mp4", name.as_bytes().to_vec());
            ClipReference::new(ClipId::from(name), blob_id)
        }

        fn leftover_entries(&self) -> usize {
            std::fs::read_dir(self.work_root.path()).unwrap().count()
        }
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_untrimmed_three_clips() {
        let h = Harness::new(RecordingTranscoder::default());
        let clips = vec![h.clip("a"), h.clip("b"), h.clip("c")];

        let result = assemble_story(&h.assembler, clips, None).await.unwrap();

        assert!(h.transcoder.trims().is_empty());
        let (entries, options) = h.transcoder.concat();
        assert_eq!(options, ConcatOptions::stream_copy());
        assert_eq!(options.max_duration, None);
        assert_eq!(file_names(&entries), ["000-raw.mp4", "001-raw.mp4", "002-raw.mp4"]);

        assert_eq!(h.store.contents(&result.output_blob_id).unwrap(), b"abc");
        assert_eq!(h.store.content_type(&result.output_blob_id).as_deref(), Some("video/mp4"));
        assert_eq!(h.store.len(), 4);
        let name = h.store.upload_names().pop().unwrap();
        assert!(name.starts_with("story-") && name.ends_with(".mp4"));
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_five_clips_eight_seconds() {
        let h = Harness::new(RecordingTranscoder::default());
        let clips: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|n| h.clip(n)).collect();

        let result = assemble_story(&h.assembler, clips, Some(8.0)).await.unwrap();

        let trims = h.transcoder.trims();
        assert_eq!(trims.len(), 5);
        assert!(trims.iter().all(|(_, start, duration)| *start == 0.0 && *duration == 2.0));

        let (entries, options) = h.transcoder.concat();
        assert!(options.reencode);
        assert_eq!(options.max_duration, Some(8.0));
        assert_eq!(
            file_names(&entries),
            [
                "000-trimmed.mp4",
                "001-trimmed.mp4",
                "002-trimmed.mp4",
                "003-trimmed.mp4",
                "004-trimmed.mp4"
            ]
        );
        assert_eq!(h.store.contents(&result.output_blob_id).unwrap(), b"[a][b][c][d][e]");
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_trim_length_follows_target_share() {
        let h = Harness::new(RecordingTranscoder::default());
        let clips = vec![h.clip("a"), h.clip("b"), h.clip("c")];

        assemble_story(&h.assembler, clips, Some(31.5)).await.unwrap();

        assert!(h.transcoder.trims().iter().all(|(_, _, d)| *d == 10.0));
        assert_eq!(h.transcoder.concat().1.max_duration, Some(31.5));
    }

    #[tokio::test]
    async fn test_single_clip_still_concatenates() {
        let h = Harness::new(RecordingTranscoder::default());
        let clips = vec![h.clip("only")];

        let result = assemble_story(&h.assembler, clips, None).await.unwrap();

        assert_eq!(h.transcoder.concat().0.len(), 1);
        assert_eq!(h.store.contents(&result.output_blob_id).unwrap(), b"only");
    }

    #[tokio::test]
    async fn test_reordering_clips_reorders_output() {
        let h = Harness::new(RecordingTranscoder::default());
        let (a, b, c) = (h.clip("a"), h.clip("b"), h.clip("c"));

        let forward = assemble_story(&h.assembler, vec![a.clone(), b.clone(), c.clone()], None)
            .await
            .unwrap();
        let reversed = assemble_story(&h.assembler, vec![c, b, a], None).await.unwrap();

        assert_eq!(h.store.contents(&forward.output_blob_id).unwrap(), b"abc");
        assert_eq!(h.store.contents(&reversed.output_blob_id).unwrap(), b"cba");
    }

    #[tokio::test]
    async fn test_manifest_order_ignores_completion_order() {
        let h = Harness::new(RecordingTranscoder {
            stagger: true,
            ..Default::default()
        });
        let clips: Vec<_> = ["a", "b", "c", "d"].iter().map(|n| h.clip(n)).collect();

        let result = assemble_story(&h.assembler, clips, Some(20.0)).await.unwrap();

        // Staggered trims complete last-index-first
        let trim_order: Vec<_> = h.transcoder.trims().iter().map(|(p, _, _)| clip_index(p)).collect();
        assert_eq!(trim_order, [3, 2, 1, 0]);
        assert_eq!(h.store.contents(&result.output_blob_id).unwrap(), b"[a][b][c][d]");
    }

    #[tokio::test]
    async fn test_duplicate_clips_are_allowed() {
        let h = Harness::new(RecordingTranscoder::default());
        let a = h.clip("a");

        let result = assemble_story(&h.assembler, vec![a.clone(), a.clone(), a], None)
            .await
            .unwrap();

        assert_eq!(h.store.contents(&result.output_blob_id).unwrap(), b"aaa");
    }

    #[tokio::test]
    async fn test_repeat_assembly_creates_new_blob() {
        let h = Harness::new(RecordingTranscoder::default());
        let request = AssemblyRequest::new(vec![h.clip("a"), h.clip("b")]);

        let first = h.assembler.assemble(&request).await.unwrap();
        let second = h.assembler.assemble(&request).await.unwrap();

        assert_ne!(first.output_blob_id, second.output_blob_id);
        assert_eq!(
            h.store.contents(&first.output_blob_id),
            h.store.contents(&second.output_blob_id)
        );
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_start() {
        let h = Harness::new(RecordingTranscoder::default());

        let empty = assemble_story(&h.assembler, vec![], None).await;
        assert!(matches!(empty, Err(AssemblyError::InvalidRequest(_))));

        for target in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let result = assemble_story(&h.assembler, vec![h.clip("a")], Some(target)).await;
            assert!(matches!(result, Err(AssemblyError::InvalidRequest(_))), "target {}", target);
        }

        assert!(h.transcoder.calls().is_empty());
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_missing_clip_aborts_and_cleans_up() {
        let h = Harness::new(RecordingTranscoder::default());
        let missing = ClipReference::new(ClipId::from("gone"), BlobId::from("no-such-blob"));
        let clips = vec![h.clip("a"), missing, h.clip("c")];
        let stored_before = h.store.len();

        let result = assemble_story(&h.assembler, clips, Some(6.0)).await;

        match result {
            Err(AssemblyError::ClipNotFound { clip_id, blob_id }) => {
                assert_eq!(clip_id.as_str(), "gone");
                assert_eq!(blob_id.as_str(), "no-such-blob");
            }
            other => panic!("expected ClipNotFound, got {:?}", other),
        }
        assert!(h
            .transcoder
            .calls()
            .iter()
            .all(|c| !matches!(c, Call::Concat { .. })));
        assert_eq!(h.store.len(), stored_before);
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_download_failure_is_storage_error() {
        let store = MemoryBlobStore::new();
        let broken = store.insert("b", "video/mp4", b"b".to_vec());
        let h = Harness::with_store(store, RecordingTranscoder::default(), |inner| {
            Arc::new(FlakyStore {
                inner,
                fail_download_of: Some(broken.clone()),
                fail_uploads: false,
            }) as Arc<dyn BlobStore>
        });
        let clips = vec![h.clip("a"), ClipReference::new(ClipId::from("b"), broken.clone())];

        let result = assemble_story(&h.assembler, clips, None).await;

        assert!(matches!(result, Err(AssemblyError::Storage(_))));
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_trim_failure_aborts_whole_job() {
        let h = Harness::new(RecordingTranscoder {
            fail_trim_of: Some(1),
            ..Default::default()
        });
        let clips = vec![h.clip("a"), h.clip("b"), h.clip("c")];
        let stored_before = h.store.len();

        let result = assemble_story(&h.assembler, clips, Some(9.0)).await;

        assert!(matches!(result, Err(AssemblyError::Transcode(_))));
        assert_eq!(h.store.len(), stored_before);
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_concat_failure_uploads_nothing() {
        let h = Harness::new(RecordingTranscoder {
            fail_concat: true,
            ..Default::default()
        });
        let clips = vec![h.clip("a"), h.clip("b")];
        let stored_before = h.store.len();

        let result = assemble_story(&h.assembler, clips, None).await;

        assert!(matches!(result, Err(AssemblyError::Transcode(_))));
        assert_eq!(h.store.len(), stored_before);
        assert_eq!(h.leftover_entries(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_is_storage_error() {
        let h = Harness::with_store(MemoryBlobStore::new(), RecordingTranscoder::default(), |inner| {
            Arc::new(FlakyStore {
                inner,
                fail_download_of: None,
                fail_uploads: true,
            }) as Arc<dyn BlobStore>
        });
        let clips = vec![h.clip("a")];

        let result = assemble_story(&h.assembler, clips, None).await;

        assert!(matches!(result, Err(AssemblyError::Storage(_))));
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.leftover_entries(), 0);
    }
}
