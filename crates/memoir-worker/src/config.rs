//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use memoir_media::Workspace;

/// Assembly engine configuration.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Kill any single FFmpeg invocation after this long
    pub ffmpeg_timeout: Duration,
    /// Clips downloaded and trimmed concurrently within one job
    pub clip_parallelism: usize,
    /// Name prefix of rendered story blobs
    pub output_prefix: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("memoir"),
            ffmpeg_timeout: Duration::from_secs(1800),
            clip_parallelism: 2,
            output_prefix: "story".to_string(),
        }
    }
}

impl AssemblyConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("MEMOIR_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_timeout: std::env::var("MEMOIR_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            clip_parallelism: std::env::var("MEMOIR_CLIP_PARALLELISM")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.clip_parallelism)
                .max(1),
            output_prefix: std::env::var("MEMOIR_OUTPUT_PREFIX")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.output_prefix),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_clip_parallelism(mut self, parallelism: usize) -> Self {
        self.clip_parallelism = parallelism.max(1);
        self
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.work_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssemblyConfig::default();
        assert_eq!(config.clip_parallelism, 2);
        assert_eq!(config.ffmpeg_timeout, Duration::from_secs(1800));
        assert_eq!(config.output_prefix, "story");
        assert!(config.work_dir.ends_with("memoir"));
    }

    #[test]
    fn test_parallelism_is_at_least_one() {
        let config = AssemblyConfig::default().with_clip_parallelism(0);
        assert_eq!(config.clip_parallelism, 1);
    }
}
