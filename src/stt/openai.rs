// src/stt/openai.rs
// OpenAI Whisper STT Adapter (cloud provider)

use super::retry::RetryPolicy;
use super::whisper_api::{self, TranscriptionRequest, TRANSCRIPTIONS_PATH};
use super::{STTAdapter, STTError, TranscriptionSegment};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const OPENAI_API_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "whisper-1";
/// OpenAI rejects uploads above 25 MiB.
const MAX_FILE_SIZE_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_CONFIDENCE: f32 = 0.95;

pub struct OpenAIWhisperAdapter {
    api_key: Option<String>,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAIWhisperAdapter {
    pub fn new(
        api_key: Option<String>,
        base_url: &str,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, STTError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| STTError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        let api_key = api_key.filter(|k| !k.trim().is_empty());

        tracing::info!(
            "OpenAI Whisper adapter initialized: model={}, key_configured={}",
            model,
            api_key.is_some()
        );

        Ok(Self {
            api_key,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), TRANSCRIPTIONS_PATH),
            model: model.to_string(),
            client,
            retry,
        })
    }
}

#[async_trait]
impl STTAdapter for OpenAIWhisperAdapter {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptionSegment>, STTError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| STTError::NotConfigured("OpenAI API key".to_string()))?;

        if audio.is_empty() {
            return Err(STTError::InvalidAudio);
        }

        if audio.len() > MAX_FILE_SIZE_BYTES {
            tracing::warn!(
                "OpenAI Whisper: audio too large ({:.2}MB > 25MB)",
                audio.len() as f64 / (1024.0 * 1024.0)
            );
            return Err(STTError::AudioTooLarge(audio.len()));
        }

        tracing::debug!(
            "OpenAI Whisper: transcribing {}KB audio, language={}",
            audio.len() / 1024,
            language
        );

        let request = TranscriptionRequest {
            url: &self.endpoint,
            bearer_token: Some(api_key),
            model: &self.model,
            language,
            default_confidence: DEFAULT_CONFIDENCE,
        };

        whisper_api::send_with_retry(
            &self.client,
            &request,
            audio,
            &self.retry,
            cancel,
            self.name(),
        )
        .await
    }

    async fn check_health(&self) -> Result<String, STTError> {
        match self.api_key {
            Some(_) => Ok("API key configured".to_string()),
            None => Err(STTError::NotConfigured("No API key".to_string())),
        }
    }

    fn name(&self) -> &str {
        "OpenAI Whisper"
    }
}
