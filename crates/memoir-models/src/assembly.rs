//! Story assembly request and plan models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BlobId, ClipReference};

/// Shortest segment any clip is trimmed to, regardless of the target.
pub const MIN_CLIP_SECONDS: f64 = 2.0;

/// Request to render an ordered set of clips into one story video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyRequest {
    /// Clips in concatenation order
    pub clips: Vec<ClipReference>,
    /// Optional target length of the rendered story
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration_seconds: Option<f64>,
}

impl AssemblyRequest {
    /// Create a request that concatenates every clip in full.
    pub fn new(clips: Vec<ClipReference>) -> Self {
        Self {
            clips,
            target_duration_seconds: None,
        }
    }

    /// Set the target duration.
    pub fn with_target_duration(mut self, seconds: f64) -> Self {
        self.target_duration_seconds = Some(seconds);
        self
    }

    /// Validate the request.
    pub fn validate(&self) -> Result<(), String> {
        if self.clips.is_empty() {
            return Err("At least one clip is required".to_string());
        }

        if let Some(target) = self.target_duration_seconds {
            if !target.is_finite() || target <= 0.0 {
                return Err(format!(
                    "Target duration must be a positive number of seconds, got {}",
                    target
                ));
            }
        }

        Ok(())
    }

    /// Number of clips in the request.
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Derive the trim plan for this request.
    pub fn plan(&self) -> AssemblyPlan {
        match self.target_duration_seconds {
            None => AssemblyPlan::Untrimmed,
            Some(target) => AssemblyPlan::Trimmed {
                per_clip_seconds: per_clip_seconds(target, self.clips.len()),
                max_output_seconds: target,
            },
        }
    }
}

/// Seconds kept from the start of each clip when fitting `clip_count` clips
/// into `target_seconds`.
///
/// The floor of [`MIN_CLIP_SECONDS`] means the sum can exceed the target; the
/// output-side cap in [`AssemblyPlan::Trimmed`] is what bounds the result.
pub fn per_clip_seconds(target_seconds: f64, clip_count: usize) -> f64 {
    let share = (target_seconds / clip_count.max(1) as f64).floor();
    share.max(MIN_CLIP_SECONDS)
}

/// How clips are prepared and joined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AssemblyPlan {
    /// Full clips joined with stream copy, no duration cap
    Untrimmed,
    /// Every clip cut to `[0, per_clip_seconds)`, re-encoded and capped
    Trimmed {
        per_clip_seconds: f64,
        max_output_seconds: f64,
    },
}

impl AssemblyPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyPlan::Untrimmed => "untrimmed",
            AssemblyPlan::Trimmed { .. } => "trimmed",
        }
    }

    /// Whether the concatenation step must re-encode.
    pub fn reencode(&self) -> bool {
        matches!(self, AssemblyPlan::Trimmed { .. })
    }

    /// Hard ceiling on the rendered duration, if any.
    pub fn max_output_seconds(&self) -> Option<f64> {
        match self {
            AssemblyPlan::Untrimmed => None,
            AssemblyPlan::Trimmed {
                max_output_seconds, ..
            } => Some(*max_output_seconds),
        }
    }
}

impl fmt::Display for AssemblyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single durable artifact of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyResult {
    /// Blob holding the rendered story video
    pub output_blob_id: BlobId,
}

/// Role of a scratch file inside a job's working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// Full download of a source blob
    Raw,
    /// Trimmed segment of a raw file
    Trimmed,
    /// Concat demuxer input list
    Manifest,
    /// Final rendered file
    Output,
    /// Extracted audio track
    Audio,
    /// Extracted preview frame
    Thumbnail,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Raw => "raw",
            FileRole::Trimmed => "trimmed",
            FileRole::Manifest => "manifest",
            FileRole::Output => "output",
            FileRole::Audio => "audio",
            FileRole::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clips(n: usize) -> Vec<ClipReference> {
        (0..n)
            .map(|i| ClipReference::new(format!("clip-{}", i), format!("blob-{}", i)))
            .collect()
    }

    #[test]
    fn test_per_clip_seconds_floor() {
        assert_eq!(per_clip_seconds(8.0, 5), 2.0);
        assert_eq!(per_clip_seconds(30.0, 3), 10.0);
        assert_eq!(per_clip_seconds(31.0, 3), 10.0);
        assert_eq!(per_clip_seconds(1.0, 10), MIN_CLIP_SECONDS);
        assert_eq!(per_clip_seconds(7.0, 0), 7.0);
    }

    #[test]
    fn test_validate_rejects_empty_clips() {
        let request = AssemblyRequest::new(Vec::new());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_target() {
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let request = AssemblyRequest::new(clips(2)).with_target_duration(bad);
            assert!(request.validate().is_err(), "target {} should be rejected", bad);
        }

        let ok = AssemblyRequest::new(clips(2)).with_target_duration(0.5);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_plan_without_target_is_untrimmed() {
        let plan = AssemblyRequest::new(clips(3)).plan();
        assert_eq!(plan, AssemblyPlan::Untrimmed);
        assert!(!plan.reencode());
        assert_eq!(plan.max_output_seconds(), None);
    }

    #[test]
    fn test_plan_with_target_caps_output() {
        let plan = AssemblyRequest::new(clips(5)).with_target_duration(8.0).plan();
        assert_eq!(
            plan,
            AssemblyPlan::Trimmed {
                per_clip_seconds: 2.0,
                max_output_seconds: 8.0,
            }
        );
        assert!(plan.reencode());
        assert_eq!(plan.max_output_seconds(), Some(8.0));
    }

    #[test]
    fn test_request_deserializes_without_target() {
        let json = r#"{"clips":[{"id":"c1","blob_id":"b1"}]}"#;
        let request: AssemblyRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.clip_count(), 1);
        assert_eq!(request.target_duration_seconds, None);
    }
}
