//! Story composition.
//!
//! A story is a narrative plus, when rendering succeeds, an assembled video.
//! Rendering failures never fail the story: the draft is returned without a
//! video so the caller can still save it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use memoir_models::{StoryDraft, StoryMetadata, StoryRequest};
use tracing::{info, warn};

use crate::assembly::{assemble_story, ClipAssembler};
use crate::error::{AssemblyError, NarrationError};

/// Narrative used when the narrator fails.
pub const NARRATIVE_FALLBACK: &str = "Story generation failed. Please try again later.";

/// Writes the narrative text of a story.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, request: &StoryRequest) -> Result<String, NarrationError>;
}

/// Builds story drafts from a narrator and the assembly engine.
#[derive(Clone)]
pub struct StoryComposer {
    narrator: Arc<dyn Narrator>,
    assembler: ClipAssembler,
}

impl StoryComposer {
    pub fn new(narrator: Arc<dyn Narrator>, assembler: ClipAssembler) -> Self {
        Self {
            narrator,
            assembler,
        }
    }

    /// Compose a story. Only an invalid request is an error.
    pub async fn compose(&self, request: StoryRequest) -> Result<StoryDraft, AssemblyError> {
        request.validate().map_err(AssemblyError::InvalidRequest)?;

        let (narrative, rendered) = tokio::join!(
            self.narrator.narrate(&request),
            assemble_story(
                &self.assembler,
                request.clips.clone(),
                request.target_duration_seconds,
            )
        );

        let narrative = narrative.unwrap_or_else(|e| {
            warn!(error = %e, "Narrative generation failed, using fallback text");
            NARRATIVE_FALLBACK.to_string()
        });

        let rendered_video_id = match rendered {
            Ok(result) => Some(result.output_blob_id),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Story video assembly failed, saving story without video");
                None
            }
        };

        let draft = StoryDraft {
            title: request.derive_title(),
            narrative,
            clip_ids: request.clips.iter().map(|c| c.id.clone()).collect(),
            rendered_video_id,
            story_type: request.story_type,
            metadata: StoryMetadata::from_request(&request),
            created_at: Utc::now(),
        };

        info!(
            title = %draft.title,
            clips = draft.clip_ids.len(),
            rendered = draft.rendered_video_id.is_some(),
            "Story composed"
        );
        Ok(draft)
    }
}
