//! Story creation models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BlobId, ClipId, ClipReference};

/// Longest prompt sentence accepted as a story title.
const MAX_PROMPT_TITLE_CHARS: usize = 100;

/// Kind of story being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryType {
    #[default]
    Inspirational,
    EmotionalJourney,
    MemoryLane,
    Achievement,
    FamilyMoment,
    Custom,
}

impl StoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryType::Inspirational => "inspirational",
            StoryType::EmotionalJourney => "emotional_journey",
            StoryType::MemoryLane => "memory_lane",
            StoryType::Achievement => "achievement",
            StoryType::FamilyMoment => "family_moment",
            StoryType::Custom => "custom",
        }
    }
}

impl fmt::Display for StoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request to generate a story from owned clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryRequest {
    /// Clips in story order
    pub clips: Vec<ClipReference>,
    /// Free-form user prompt for the narrative
    #[serde(default)]
    pub prompt: Option<String>,
    /// Explicit title; derived when absent
    #[serde(default)]
    pub title: Option<String>,
    /// Theme used for the fallback title
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub story_type: StoryType,
    /// Target length of the rendered video
    #[serde(default)]
    pub target_duration_seconds: Option<f64>,
}

impl StoryRequest {
    pub fn new(clips: Vec<ClipReference>) -> Self {
        Self {
            clips,
            prompt: None,
            title: None,
            theme: None,
            story_type: StoryType::default(),
            target_duration_seconds: None,
        }
    }

    /// Validate the request.
    pub fn validate(&self) -> Result<(), String> {
        if self.clips.is_empty() {
            return Err("Video IDs are required".to_string());
        }
        Ok(())
    }

    /// Resolve the story title.
    ///
    /// An explicit title wins. Otherwise the first sentence of the prompt is
    /// used when it is non-empty and shorter than 100 characters, and finally
    /// the theme and story type are combined.
    pub fn derive_title(&self) -> String {
        if let Some(title) = self.title.as_deref().map(str::trim) {
            if !title.is_empty() {
                return title.to_string();
            }
        }

        if let Some(prompt) = self.prompt.as_deref() {
            let first_sentence = prompt
                .split(['.', '!', '?'])
                .next()
                .unwrap_or_default()
                .trim();
            let len = first_sentence.chars().count();
            if len > 0 && len < MAX_PROMPT_TITLE_CHARS {
                return first_sentence.to_string();
            }
            return "AI Generated Story".to_string();
        }

        let theme = self
            .theme
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Inspirational");
        format!("{} {}", theme, self.story_type.as_str().replacen('_', " ", 1))
    }
}

/// Derived facts about a story's source clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryMetadata {
    /// Sum of known clip durations in seconds
    pub total_duration: f64,
    pub clip_count: usize,
    /// Requested target, or the total duration when none was requested
    pub target_duration: f64,
}

impl StoryMetadata {
    pub fn from_request(request: &StoryRequest) -> Self {
        let total_duration = request
            .clips
            .iter()
            .filter_map(|c| c.duration_hint)
            .sum::<f64>();
        Self {
            total_duration,
            clip_count: request.clips.len(),
            target_duration: request.target_duration_seconds.unwrap_or(total_duration),
        }
    }
}

/// A generated story ready to be persisted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryDraft {
    pub title: String,
    pub narrative: String,
    pub clip_ids: Vec<ClipId>,
    /// Rendered story video; `None` when assembly failed
    pub rendered_video_id: Option<BlobId>,
    pub story_type: StoryType,
    pub metadata: StoryMetadata,
    pub created_at: DateTime<Utc>,
}
