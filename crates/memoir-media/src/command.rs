//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, FfmpegProgress};

/// Diagnostic stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One FFmpeg invocation: a single input, a single output.
///
/// Arguments pushed before the input apply to how it is read (`-f concat`,
/// `-ss`, `-t`); arguments after it apply to the written file.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    input_args: Vec<String>,
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Force the input demuxer.
    pub fn input_format(self, format: impl Into<String>) -> Self {
        self.input_arg("-f").input_arg(format)
    }

    /// Read a concat demuxer list whose entries may be absolute paths.
    pub fn concat_list(self) -> Self {
        self.input_format("concat").input_args(["-safe", "0"])
    }

    /// Start reading the input at `seconds`.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format_secs(seconds))
    }

    /// Limit how much of the input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format_secs(seconds))
    }

    /// Cap the duration of the written output.
    pub fn max_output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format_secs(seconds))
    }

    /// Copy every stream without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_args(["-c", "copy"])
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn sample_rate(self, hz: u32) -> Self {
        self.output_arg("-ar").output_arg(hz.to_string())
    }

    pub fn audio_channels(self, channels: u8) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Force the output muxer.
    pub fn output_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Write exactly one video frame.
    pub fn single_frame(self) -> Self {
        self.output_args(["-frames:v", "1"])
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Full argument list, always overwriting the output and reporting
    /// progress on stderr.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.display().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }
}

fn format_secs(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

/// Spawns FFmpeg, enforcing an optional wall-clock limit.
///
/// The child is killed when the limit passes or when the returned future is
/// dropped, so cancelling a job never leaves an encoder running.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run `cmd`, handing every completed progress block to `on_progress`.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let ffmpeg = check_ffmpeg()?;
        let args = cmd.build_args();
        debug!(command = %format!("ffmpeg {}", args.join(" ")), "Spawning FFmpeg");

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "ffmpeg stderr not captured"))?;
        let collector = tokio::spawn(collect_stderr(stderr, on_progress));

        let status = self.wait(&mut child).await;
        let tail = collector.await.unwrap_or_default();

        match status? {
            status if status.success() => Ok(()),
            status => Err(MediaError::ffmpeg_failed(
                format!("exited with {}", status),
                None,
                status.code(),
            )
            .with_stderr(tail)),
        }
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "FFmpeg exceeded its time limit, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill FFmpeg");
                }
                Err(MediaError::Timeout {
                    tool: "ffmpeg",
                    secs: limit.as_secs(),
                })
            }
        }
    }
}

/// Drain stderr: progress blocks go to `on_progress`, the last diagnostic
/// lines are returned joined for error reports.
async fn collect_stderr<R, F>(stderr: R, on_progress: F) -> String
where
    R: AsyncRead + Unpin,
    F: Fn(FfmpegProgress),
{
    let mut lines = BufReader::new(stderr).lines();
    let mut progress = FfmpegProgress::default();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if is_progress_line(&line) {
            if let Some(snapshot) = progress.apply_line(&line) {
                on_progress(snapshot);
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg"))
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::ToolNotFound("ffprobe"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_trim_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(0.0)
            .duration(2.0)
            .video_codec("libx264")
            .crf(23);

        let args = cmd.build_args();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let t_pos = args.iter().position(|a| a == "-t").unwrap();
        assert!(t_pos < input_pos, "trim duration limits the input");
        assert!(args.contains(&"2.000".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn test_concat_command_builder() {
        let cmd = FfmpegCommand::new("inputs.txt", "story.mp4")
            .concat_list()
            .codec_copy();

        let args = cmd.build_args();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(&args[input_pos - 4..input_pos], ["-f", "concat", "-safe", "0"]);
        assert_eq!(&args[input_pos + 2..input_pos + 4], ["-c", "copy"]);
    }

    #[test]
    fn test_output_duration_cap_follows_input() {
        let cmd = FfmpegCommand::new("inputs.txt", "story.mp4").max_output_duration(8.0);

        let args = cmd.build_args();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let t_pos = args.iter().position(|a| a == "-t").unwrap();
        assert!(t_pos > input_pos, "output cap applies to the written file");
        assert_eq!(args[t_pos + 1], "8.000");
    }

    #[tokio::test]
    async fn test_stderr_split_between_progress_and_tail() {
        let stderr: &[u8] = b"frame=10\nout_time_us=1000000\nprogress=continue\n\
            [mov,mp4] moov atom not found\n\nframe=20\nprogress=end\ninputs.txt: Invalid data\n";
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let tail = collect_stderr(stderr, move |p| sink.lock().unwrap().push(p)).await;

        assert_eq!(tail, "[mov,mp4] moov atom not found\ninputs.txt: Invalid data");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].out_time_ms, 1000);
        assert!(seen[1].is_complete);
    }

    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let text: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = collect_stderr(text.as_bytes(), |_| {}).await;

        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 30");
        assert_eq!(*lines.last().unwrap(), "line 49");
    }
}
