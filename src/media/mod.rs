// src/media/mod.rs
// Media toolkit - audio extraction, chunk cutting, duration probing

mod ffmpeg;

pub use ffmpeg::FfmpegToolkit;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to launch {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Output file was not created: {0}")]
    MissingOutput(PathBuf),

    #[error("Could not parse duration from '{0}'")]
    InvalidDuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,
}

/// External media collaborator. Produces 16 kHz mono PCM WAV files.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Demux the audio track of `video` into `out`.
    async fn extract_audio(
        &self,
        video: &Path,
        out: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError>;

    /// Cut `[start, start + duration)` seconds of `audio` into `out`.
    async fn cut_chunk(
        &self,
        audio: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        out: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError>;

    /// Total duration of `audio`, in seconds.
    async fn probe_duration(
        &self,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<f64, MediaError>;
}
