// src/stt/whisper_api.rs
// Shared client for OpenAI-compatible `/v1/audio/transcriptions` endpoints

use super::retry::RetryPolicy;
use super::{STTError, TranscriptionSegment};
use regex::Regex;
use reqwest::multipart;
use serde::Deserialize;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

pub const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";
const RESPONSE_FORMAT: &str = "verbose_json";
const TEMPERATURE: &str = "0.0";

#[derive(Debug, Deserialize)]
pub struct VerboseJsonResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub segments: Option<Vec<VerboseJsonSegment>>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
pub struct VerboseJsonSegment {
    #[serde(default)]
    pub id: i64,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub avg_logprob: f64,
    #[serde(default)]
    pub no_speech_prob: f64,
}

impl VerboseJsonResponse {
    /// Convert provider segments into chunk-relative transcription segments.
    pub fn into_segments(
        self,
        default_confidence: f32,
    ) -> Result<Vec<TranscriptionSegment>, STTError> {
        let segments = self
            .segments
            .ok_or_else(|| STTError::InvalidResponse("missing segments".to_string()))?;

        Ok(segments
            .into_iter()
            .enumerate()
            .map(|(index, s)| {
                TranscriptionSegment::new(
                    index,
                    s.start,
                    s.end,
                    clean_segment_text(&s.text),
                    confidence_from_logprob(s.avg_logprob, default_confidence),
                )
            })
            .collect())
    }
}

/// Request parameters for one transcription call.
pub struct TranscriptionRequest<'a> {
    pub url: &'a str,
    pub bearer_token: Option<&'a str>,
    pub model: &'a str,
    pub language: &'a str,
    pub default_confidence: f32,
}

/// `"it-IT"` -> `"it"`; Whisper endpoints expect ISO-639-1 codes.
pub fn normalize_language(language: &str) -> String {
    let trimmed = language.trim();
    trimmed
        .split(['-', '_'])
        .next()
        .unwrap_or(trimmed)
        .to_lowercase()
}

pub fn confidence_from_logprob(avg_logprob: f64, default_confidence: f32) -> f32 {
    if avg_logprob > -1.0 {
        (avg_logprob.exp() as f32).clamp(0.0, 1.0)
    } else {
        default_confidence
    }
}

pub fn clean_segment_text(text: &str) -> String {
    static TS_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = TS_RE.get_or_init(|| Regex::new(r"\[\d{2}:\d{2}.*?\]|\(\d{2}:\d{2}\)").ok());
    let stripped = match re {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Send the request once, mapping HTTP status codes onto [`STTError`].
pub async fn send_once(
    client: &reqwest::Client,
    request: &TranscriptionRequest<'_>,
    audio: &[u8],
) -> Result<Vec<TranscriptionSegment>, STTError> {
    let file_part = multipart::Part::bytes(audio.to_vec())
        .file_name("audio.wav")
        .mime_str("audio/wav")
        .map_err(|e| STTError::ProviderError(e.to_string()))?;

    let form = multipart::Form::new()
        .part("file", file_part)
        .text("model", request.model.to_string())
        .text("language", normalize_language(request.language))
        .text("response_format", RESPONSE_FORMAT)
        .text("temperature", TEMPERATURE);

    let mut builder = client.post(request.url).multipart(form);
    if let Some(token) = request.bearer_token {
        builder = builder.bearer_auth(token);
    }

    let resp = builder.send().await?;
    let status = resp.status();

    if status.is_success() {
        let body = resp.text().await?;
        let parsed: VerboseJsonResponse = serde_json::from_str(&body)
            .map_err(|e| STTError::InvalidResponse(e.to_string()))?;
        parsed.into_segments(request.default_confidence)
    } else if status.as_u16() == 401 {
        Err(STTError::AuthenticationError)
    } else if status.as_u16() == 413 {
        Err(STTError::AudioTooLarge(audio.len()))
    } else if status.as_u16() == 429 {
        Err(STTError::RateLimitError)
    } else {
        let error_text = resp.text().await.unwrap_or_default();
        Err(STTError::ProviderError(format!(
            "HTTP {}: {}",
            status, error_text
        )))
    }
}

/// Send with the backend's retry policy, racing the cancellation token.
pub async fn send_with_retry(
    client: &reqwest::Client,
    request: &TranscriptionRequest<'_>,
    audio: &[u8],
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    provider: &str,
) -> Result<Vec<TranscriptionSegment>, STTError> {
    let mut attempt = 0u8;

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(STTError::Cancelled),
            r = send_once(client, request, audio) => r,
        };

        match outcome {
            Ok(segments) => return Ok(segments),
            Err(e) if retry.should_retry(attempt, &e) => {
                tracing::warn!(
                    "{} attempt {}/{} failed: {}",
                    provider,
                    attempt + 1,
                    retry.max_retries() + 1,
                    e
                );
                retry.wait_before_retry(attempt, cancel).await?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
