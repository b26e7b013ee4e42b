//! Media error types.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// Failure of an FFmpeg/FFprobe invocation or of its local inputs.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("{tool} failed: {message}")]
    ToolFailed {
        tool: &'static str,
        message: String,
        /// Last lines of the tool's diagnostic output
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{tool} killed after {secs}s")]
    Timeout { tool: &'static str, secs: u64 },

    #[error("Input file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid media input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable probe output: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            tool: "ffmpeg",
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn ffprobe_failed(stderr: Option<String>, exit_code: Option<i32>) -> Self {
        Self::ToolFailed {
            tool: "ffprobe",
            message: "could not read streams".to_string(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Captured tool stderr, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::ToolFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }

    /// Attach a stderr tail to a tool failure that has none yet.
    pub fn with_stderr(self, tail: String) -> Self {
        match self {
            MediaError::ToolFailed {
                tool,
                message,
                stderr: None,
                exit_code,
            } if !tail.is_empty() => MediaError::ToolFailed {
                tool,
                message,
                stderr: Some(tail),
                exit_code,
            },
            other => other,
        }
    }
}
