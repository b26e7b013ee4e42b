//! Encoding policy for rendered stories and derived media.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const STORY_VIDEO_CODEC: &str = "libx264";
pub const STORY_AUDIO_CODEC: &str = "aac";
/// Stories are short and rendered on request, so speed wins over size.
pub const STORY_PRESET: &str = "ultrafast";
pub const STORY_CRF: u8 = 23;
pub const STORY_AUDIO_BITRATE: &str = "128k";

/// Speech-to-text input: mono 16 kHz signed 16-bit PCM in a WAV container.
pub const SPEECH_AUDIO_CODEC: &str = "pcm_s16le";
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;
pub const SPEECH_CHANNELS: u8 = 1;

pub const THUMBNAIL_WIDTH: u32 = 320;
pub const THUMBNAIL_HEIGHT: u32 = 240;

/// Codec settings applied whenever a file is re-encoded.
///
/// Missing fields deserialize to the story policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    pub codec: String,
    pub preset: String,
    /// Constant Rate Factor, 0-51, lower is better
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::story_reencode()
    }
}

impl EncodingConfig {
    /// Fixed re-encode policy for trimmed story concatenation (H.264/AAC MP4).
    ///
    /// Not configurable per request.
    pub fn story_reencode() -> Self {
        Self {
            codec: STORY_VIDEO_CODEC.to_string(),
            preset: STORY_PRESET.to_string(),
            crf: STORY_CRF,
            audio_codec: STORY_AUDIO_CODEC.to_string(),
            audio_bitrate: STORY_AUDIO_BITRATE.to_string(),
        }
    }
}
