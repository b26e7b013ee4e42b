//! Whisper-compatible speech-to-text client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{IngestError, IngestResult};
use crate::ingest::Transcriber;

pub const DEFAULT_TRANSCRIPTION_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

/// Transcription endpoint configuration.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Full URL of the `audio/transcriptions` endpoint
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl TranscriptionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_TRANSCRIPTION_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> IngestResult<Self> {
        let api_key = std::env::var("TRANSCRIPTION_API_KEY")
            .map_err(|_| IngestError::config_error("TRANSCRIPTION_API_KEY not set"))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("TRANSCRIPTION_API_URL") {
            config.api_url = url;
        }
        if let Ok(model) = std::env::var("TRANSCRIPTION_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// [`Transcriber`] posting WAV files to a Whisper-compatible API.
pub struct WhisperTranscriber {
    client: Client,
    config: TranscriptionConfig,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriptionConfig) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> IngestResult<Self> {
        Self::new(TranscriptionConfig::from_env()?)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> IngestResult<String> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        debug!(path = %audio.display(), bytes = bytes.len(), model = %self.config.model, "Sending audio for transcription");

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| IngestError::transcription_failed(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::transcription_failed(format!("Transcription request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IngestError::transcription_failed(format!(
                "Transcription API returned {}: {}",
                status, error_text
            )));
        }

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| {
            IngestError::transcription_failed(format!("Failed to parse transcription response: {}", e))
        })?;

        let text = parsed.text.trim().to_string();
        info!(chars = text.len(), "Transcription received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn wav_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("audio.wav");
        tokio::fs::write(&path, b"RIFF fake wave data").await.unwrap();
        path
    }

    fn transcriber(server: &MockServer) -> WhisperTranscriber {
        let config = TranscriptionConfig::new("test-key")
            .with_api_url(format!("{}/openai/v1/audio/transcriptions", server.uri()));
        WhisperTranscriber::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_transcribe_posts_multipart_and_parses_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("whisper-large-v3"))
            .and(body_string_contains("RIFF fake wave data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "  Hello, my name is Ana.  " })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let text = transcriber(&server).transcribe(&wav_file(&dir).await).await.unwrap();

        assert_eq!(text, "Hello, my name is Ana.");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = transcriber(&server)
            .transcribe(&wav_file(&dir).await)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::TranscriptionFailed(ref m) if m.contains("429") && m.contains("rate limited")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_audio_file() {
        let server = MockServer::start().await;
        let result = transcriber(&server)
            .transcribe(Path::new("/nonexistent/audio.wav"))
            .await;
        assert!(matches!(result, Err(IngestError::Io(_))));
    }
}
