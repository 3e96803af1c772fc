// src/session/mod.rs
// Per-job data: chunk plan, workspace, progress and the merged transcript

use crate::stt::TranscriptionSegment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod chunk;
pub mod materializer;
pub mod progress;
pub mod stitcher;

pub use chunk::{plan_chunks, AudioChunk, PlanError, MIN_CHUNK_SECONDS};
pub use materializer::{JobWorkspace, MaterializedChunk};
pub use progress::{ProgressDelta, ProgressObserver, ProgressSnapshot, ProgressTracker, ProviderCounts};
pub use stitcher::{MergeContext, Stitcher};

/// The two speech-recognition backends a job can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// OpenAI Whisper (cloud).
    OpenAi,
    /// Self-hosted faster-whisper server.
    FasterWhisper,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::FasterWhisper];

    /// Short id used in `model_identifier`.
    pub fn model_tag(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::FasterWhisper => "fasterwhisper",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "OpenAI"),
            Provider::FasterWhisper => write!(f, "FasterWhisper"),
        }
    }
}

/// Outcome of one chunk. A failed chunk carries no segments.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkTranscriptionResult {
    pub chunk_index: usize,
    pub chunk: AudioChunk,
    pub provider: Provider,
    pub segments: Vec<TranscriptionSegment>,
    pub processing_time_ms: u64,
    pub error: Option<String>,
}

impl ChunkTranscriptionResult {
    pub fn success(
        chunk: AudioChunk,
        provider: Provider,
        segments: Vec<TranscriptionSegment>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            chunk_index: chunk.index,
            chunk,
            provider,
            segments,
            processing_time_ms,
            error: None,
        }
    }

    pub fn failure(
        chunk: AudioChunk,
        provider: Provider,
        error: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            chunk_index: chunk.index,
            chunk,
            provider,
            segments: Vec::new(),
            processing_time_ms,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A chunk window that produced no transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub chunk_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub provider: Provider,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTranscript {
    pub job_id: String,
    pub language: String,
    pub segments: Vec<TranscriptionSegment>,
    pub total_duration_seconds: f64,
    pub model_identifier: String,
    pub transcribed_at: DateTime<Utc>,
    pub gaps: Vec<CoverageGap>,
}

impl FinalTranscript {
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_display_and_tags() {
        assert_eq!(Provider::OpenAi.to_string(), "OpenAI");
        assert_eq!(Provider::FasterWhisper.to_string(), "FasterWhisper");
        assert_eq!(Provider::OpenAi.model_tag(), "openai");
        assert_eq!(Provider::FasterWhisper.model_tag(), "fasterwhisper");
    }

    #[test]
    fn test_failure_result_has_no_segments() {
        let chunk = AudioChunk::new(3, 75.0, 95.0);
        let result = ChunkTranscriptionResult::failure(chunk, Provider::OpenAi, "boom", 12);
        assert_eq!(result.chunk_index, 3);
        assert!(result.segments.is_empty());
        assert!(!result.is_success());
    }

    #[test]
    fn test_full_text_joins_segments() {
        let transcript = FinalTranscript {
            job_id: "job".into(),
            language: "en".into(),
            segments: vec![
                TranscriptionSegment::new(0, 0.0, 1.0, " Hello ", 0.9),
                TranscriptionSegment::new(1, 1.0, 2.0, "", 0.9),
                TranscriptionSegment::new(2, 2.0, 3.0, "world", 0.9),
            ],
            total_duration_seconds: 3.0,
            model_identifier: "parallel-openai".into(),
            transcribed_at: Utc::now(),
            gaps: Vec::new(),
        };
        assert_eq!(transcript.full_text(), "Hello world");
        assert!(transcript.is_complete());
    }
}
