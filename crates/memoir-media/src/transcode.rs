//! The transcode capability used by story assembly and ingestion.
//!
//! [`Transcoder`] is the only place trim, audio extraction, concatenation and
//! thumbnail parameters are defined. [`FfmpegTranscoder`] implements it on top
//! of the FFmpeg CLI.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use memoir_models::encoding::{SPEECH_AUDIO_CODEC, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use memoir_models::EncodingConfig;
use tracing::{debug, info, trace, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::has_audio_stream;
use crate::thumbnail::generate_thumbnail;

/// How a concat manifest is joined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcatOptions {
    /// Re-encode to H.264/AAC instead of copying streams
    pub reencode: bool,
    /// Hard ceiling on the output duration in seconds
    pub max_duration: Option<f64>,
}

impl ConcatOptions {
    /// Join compatible inputs without re-encoding.
    pub fn stream_copy() -> Self {
        Self {
            reencode: false,
            max_duration: None,
        }
    }

    /// Re-encode heterogeneous inputs, optionally capping the output.
    pub fn reencode(max_duration: Option<f64>) -> Self {
        Self {
            reencode: true,
            max_duration,
        }
    }
}

/// Media transformations on local files.
///
/// Implementations are stateless per call and safe to share across jobs.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write `[start_secs, start_secs + duration_secs)` of `input` to `output`.
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        duration_secs: f64,
    ) -> MediaResult<PathBuf>;

    /// Extract a mono 16 kHz WAV track.
    ///
    /// Returns `Ok(None)` when the input has no audio stream; silent clips and
    /// stills are valid inputs.
    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<Option<PathBuf>>;

    /// Join the files listed in a concat manifest, in listed order.
    async fn concatenate(
        &self,
        manifest: &Path,
        output: &Path,
        options: &ConcatOptions,
    ) -> MediaResult<PathBuf>;

    /// Write a preview frame of `input` to `output`.
    async fn thumbnail(&self, input: &Path, output: &Path) -> MediaResult<PathBuf>;
}

/// [`Transcoder`] backed by the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    encoding: EncodingConfig,
    timeout_secs: Option<u64>,
}

impl FfmpegTranscoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            timeout_secs: None,
        }
    }

    /// Kill any single FFmpeg invocation that runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    fn runner(&self) -> FfmpegRunner {
        match self.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        }
    }

    fn encoded(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        cmd.video_codec(&self.encoding.codec)
            .preset(&self.encoding.preset)
            .crf(self.encoding.crf)
            .audio_codec(&self.encoding.audio_codec)
            .audio_bitrate(&self.encoding.audio_bitrate)
    }

    /// Build the trim command.
    pub fn trim_command(&self, input: &Path, output: &Path, start_secs: f64, duration_secs: f64) -> FfmpegCommand {
        self.encoded(
            FfmpegCommand::new(input, output)
                .seek(start_secs)
                .duration(duration_secs),
        )
    }

    /// Build the concatenation command.
    pub fn concat_command(&self, manifest: &Path, output: &Path, options: &ConcatOptions) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(manifest, output).concat_list();
        let cmd = if options.reencode {
            self.encoded(cmd)
        } else {
            cmd.codec_copy()
        };
        match options.max_duration {
            Some(secs) => cmd.max_output_duration(secs),
            None => cmd,
        }
    }

    /// Build the speech audio extraction command.
    pub fn audio_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .no_video()
            .audio_codec(SPEECH_AUDIO_CODEC)
            .sample_rate(SPEECH_SAMPLE_RATE)
            .audio_channels(SPEECH_CHANNELS)
            .output_format("wav")
    }

    async fn run_timed(&self, operation: &'static str, cmd: &FfmpegCommand) -> MediaResult<()> {
        let started = Instant::now();
        let result = self
            .runner()
            .run_with_progress(cmd, move |p| {
                trace!(operation, out_time_secs = p.out_time_secs(), speed = p.speed, "FFmpeg progress");
            })
            .await;
        metrics::histogram!("memoir_ffmpeg_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        result?;

        if !cmd.output_path().exists() {
            return Err(MediaError::ffmpeg_failed(
                format!("FFmpeg {} produced no output", operation),
                None,
                None,
            ));
        }
        Ok(())
    }
}

fn require_input(path: &Path) -> MediaResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MediaError::FileNotFound(path.to_path_buf()))
    }
}

/// Whether the file extension marks a still image.
fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false)
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        duration_secs: f64,
    ) -> MediaResult<PathBuf> {
        require_input(input)?;
        if duration_secs <= 0.0 {
            return Err(MediaError::invalid_input(format!(
                "trim duration must be positive, got {}",
                duration_secs
            )));
        }

        debug!(
            input = %input.display(),
            output = %output.display(),
            start_secs,
            duration_secs,
            "Trimming clip"
        );

        let cmd = self.trim_command(input, output, start_secs, duration_secs);
        self.run_timed("trim", &cmd).await?;
        Ok(output.to_path_buf())
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<Option<PathBuf>> {
        require_input(input)?;

        if is_image(input) {
            info!(input = %input.display(), "Skipping audio extraction for image input");
            return Ok(None);
        }

        match has_audio_stream(input).await {
            Ok(true) => {}
            Ok(false) => {
                info!(input = %input.display(), "No audio stream found, skipping extraction");
                return Ok(None);
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Probe failed, treating input as silent");
                return Ok(None);
            }
        }

        let cmd = self.audio_command(input, output);
        self.run_timed("extract_audio", &cmd).await?;
        info!(output = %output.display(), "Audio extracted");
        Ok(Some(output.to_path_buf()))
    }

    async fn concatenate(
        &self,
        manifest: &Path,
        output: &Path,
        options: &ConcatOptions,
    ) -> MediaResult<PathBuf> {
        require_input(manifest)?;

        info!(
            manifest = %manifest.display(),
            output = %output.display(),
            reencode = options.reencode,
            max_duration = ?options.max_duration,
            "Concatenating clips"
        );

        let cmd = self.concat_command(manifest, output, options);
        self.run_timed("concatenate", &cmd).await?;
        Ok(output.to_path_buf())
    }

    async fn thumbnail(&self, input: &Path, output: &Path) -> MediaResult<PathBuf> {
        require_input(input)?;

        let started = Instant::now();
        let result = generate_thumbnail(&self.runner(), input, output).await;
        metrics::histogram!("memoir_ffmpeg_duration_seconds", "operation" => "thumbnail")
            .record(started.elapsed().as_secs_f64());
        result?;
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_stream_copy_concat_has_no_cap() {
        let transcoder = FfmpegTranscoder::default();
        let args = transcoder
            .concat_command(Path::new("inputs.txt"), Path::new("story.mp4"), &ConcatOptions::stream_copy())
            .build_args();

        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(position(&args, "-c:v").is_none());
        assert!(position(&args, "-t").is_none());
    }

    #[test]
    fn test_reencode_concat_applies_policy_and_cap() {
        let transcoder = FfmpegTranscoder::new(EncodingConfig::story_reencode());
        let args = transcoder
            .concat_command(
                Path::new("inputs.txt"),
                Path::new("story.mp4"),
                &ConcatOptions::reencode(Some(8.0)),
            )
            .build_args();

        let input = position(&args, "-i").unwrap();
        let cap = position(&args, "-t").unwrap();
        assert!(cap > input);
        assert_eq!(args[cap + 1], "8.000");
        assert_eq!(args[position(&args, "-c:v").unwrap() + 1], "libx264");
        assert_eq!(args[position(&args, "-c:a").unwrap() + 1], "aac");
        assert_eq!(args[position(&args, "-crf").unwrap() + 1], "23");
        assert_eq!(args[position(&args, "-preset").unwrap() + 1], "ultrafast");
    }

    #[test]
    fn test_audio_command_targets_speech_format() {
        let args = FfmpegTranscoder::default()
            .audio_command(Path::new("clip.mp4"), Path::new("clip.wav"))
            .build_args();

        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(args[position(&args, "-ar").unwrap() + 1], "16000");
        assert_eq!(args[position(&args, "-ac").unwrap() + 1], "1");
        assert_eq!(args[position(&args, "-c:a").unwrap() + 1], "pcm_s16le");
    }

    #[test]
    fn test_image_detection() {
        assert!(is_image(Path::new("photo.JPG")));
        assert!(is_image(Path::new("scan.png")));
        assert!(!is_image(Path::new("clip.mp4")));
        assert!(!is_image(Path::new("no_extension")));
    }

    #[tokio::test]
    async fn test_trim_rejects_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegTranscoder::default()
            .trim(&dir.path().join("missing.mp4"), &dir.path().join("out.mp4"), 0.0, 2.0)
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_extract_audio_skips_images() {
        let dir = tempfile::tempdir().unwrap();
        let still = dir.path().join("still.png");
        tokio::fs::write(&still, b"not really a png").await.unwrap();

        let result = FfmpegTranscoder::default()
            .extract_audio(&still, &dir.path().join("still.wav"))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_trim_and_concat_with_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=4:size=320x240:rate=25"])
            .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=4", "-shortest"])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let transcoder = FfmpegTranscoder::new(EncodingConfig::story_reencode());
        let trimmed = dir.path().join("trimmed.mp4");
        transcoder.trim(&source, &trimmed, 0.0, 2.0).await.unwrap();

        let manifest = dir.path().join("inputs.txt");
        crate::ConcatManifest::from_paths([&trimmed, &trimmed])
            .write_to(&manifest)
            .await
            .unwrap();

        let output = dir.path().join("story.mp4");
        transcoder
            .concatenate(&manifest, &output, &ConcatOptions::reencode(Some(3.0)))
            .await
            .unwrap();

        let info = crate::probe_media(&output).await.unwrap();
        assert!(info.duration <= 3.1);

        let wav = dir.path().join("story.wav");
        assert_eq!(transcoder.extract_audio(&output, &wav).await.unwrap(), Some(wav.clone()));
    }
}
