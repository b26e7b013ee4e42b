//! FFmpeg progress reporting.
//!
//! With `-progress pipe:2`, FFmpeg interleaves `key=value` lines with its
//! normal diagnostics on stderr. Each block ends with a `progress=` line.

use serde::{Deserialize, Serialize};

/// Progress snapshot emitted by FFmpeg's `-progress` stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Realtime multiple, e.g. 1.5
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Output position in seconds.
    pub fn out_time_secs(&self) -> f64 {
        self.out_time_ms as f64 / 1000.0
    }

    /// Fraction of `expected_secs` already written, clamped to `[0, 1]`.
    pub fn fraction_of(&self, expected_secs: f64) -> f64 {
        if expected_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs() / expected_secs).clamp(0.0, 1.0)
    }

    /// Fold one `key=value` line into this snapshot.
    ///
    /// Returns a copy when the line closes a block. Unparseable values keep
    /// the previous reading.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = split_progress_line(line)?;
        match key {
            // Both keys carry microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => self.frame = value.parse().unwrap_or(self.frame),
            "fps" => self.fps = value.parse().unwrap_or(self.fps),
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Whether a stderr line belongs to the `-progress` stream.
pub fn is_progress_line(line: &str) -> bool {
    split_progress_line(line).is_some()
}

fn split_progress_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim().split_once('=')?;
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}
