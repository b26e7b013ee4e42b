#![deny(unreachable_patterns)]
//! FFmpeg CLI adapter for story assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Timeouts that kill runaway processes
//! - FFprobe stream inspection
//! - Concat demuxer manifests
//! - The [`Transcoder`] capability (trim, audio extraction, concatenation, thumbnails)
//! - Per-job scratch directories with guaranteed cleanup

pub mod command;
pub mod error;
pub mod manifest;
pub mod probe;
pub mod progress;
pub mod thumbnail;
pub mod transcode;
pub mod workdir;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use manifest::ConcatManifest;
pub use probe::{has_audio_stream, probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use thumbnail::generate_thumbnail;
pub use transcode::{ConcatOptions, FfmpegTranscoder, Transcoder};
pub use workdir::{WorkingDirectory, WorkingFile, Workspace};
