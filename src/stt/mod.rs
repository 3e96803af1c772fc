// src/stt/mod.rs
// STT Module - Speech-to-Text backend adapters

mod types;
mod faster_whisper;
mod openai;
pub mod retry;
pub mod whisper_api;

pub use faster_whisper::FasterWhisperAdapter;
pub use openai::OpenAIWhisperAdapter;
pub use retry::RetryPolicy;
pub use types::{STTError, TranscriptionSegment};

pub mod defaults {
    pub use super::faster_whisper::{
        DEFAULT_BASE_URL as FASTER_WHISPER_BASE_URL, DEFAULT_MODEL as FASTER_WHISPER_MODEL,
    };
    pub use super::openai::{DEFAULT_MODEL as OPENAI_MODEL, OPENAI_API_URL};
}

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Unified speech-to-text backend.
///
/// Each implementation owns its own size limits, error classification and
/// retry policy; callers must not assume they are shared.
#[async_trait]
pub trait STTAdapter: Send + Sync {
    /// Transcribe one audio file (WAV bytes). Returned segments are relative
    /// to the start of `audio`.
    async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptionSegment>, STTError>;

    /// Check reachability / credentials. `Ok` carries a human-readable status.
    async fn check_health(&self) -> Result<String, STTError>;

    /// Get provider name
    fn name(&self) -> &str;
}
