// src/stt/types.rs
// STT Types and Error Definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A timed piece of recognized speech.
///
/// Backends return segments relative to the start of the audio they were
/// given; the chunk worker rebases them onto the recording timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl TranscriptionSegment {
    pub fn new(
        index: usize,
        start_seconds: f64,
        end_seconds: f64,
        text: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            index,
            start_seconds,
            end_seconds,
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Shift both timestamps by `offset` seconds.
    pub fn rebase(&mut self, offset: f64) {
        self.start_seconds += offset;
        self.end_seconds += offset;
    }
}

/// STT Error types with retry classification
#[derive(Debug, Error)]
pub enum STTError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    TimeoutError,

    #[error("Audio too large ({0} bytes)")]
    AudioTooLarge(usize),

    #[error("Invalid audio format")]
    InvalidAudio,

    #[error("Authentication failed")]
    AuthenticationError,

    #[error("Rate limit exceeded")]
    RateLimitError,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Cancelled")]
    Cancelled,
}

impl STTError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            STTError::NetworkError(_) | STTError::TimeoutError | STTError::RateLimitError
        )
    }
}

impl From<reqwest::Error> for STTError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            STTError::TimeoutError
        } else if e.is_decode() {
            STTError::InvalidResponse(e.to_string())
        } else {
            STTError::NetworkError(e.to_string())
        }
    }
}
