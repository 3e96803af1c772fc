use crate::reporting::{ErrorReporter, Severity};
use crate::session::{
    AudioChunk, ChunkTranscriptionResult, MaterializedChunk, ProgressDelta, ProgressTracker,
    Provider,
};
use crate::stt::{STTAdapter, STTError};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Failed to read chunk file: {0}")]
    Read(#[from] std::io::Error),

    #[error("{provider} failed: {source}")]
    Backend {
        provider: Provider,
        #[source]
        source: STTError,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Worker panicked")]
    Panicked,
}

impl ChunkError {
    /// Cancellation is an expected outcome of a stopped job, not a fault.
    fn severity(&self) -> Severity {
        match self {
            ChunkError::Cancelled => Severity::Info,
            _ => Severity::Error,
        }
    }
}

/// Everything a chunk worker shares with the rest of its job.
#[derive(Clone)]
pub struct WorkerContext {
    pub job_id: String,
    pub language: String,
    pub progress: Arc<ProgressTracker>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Transcribe one chunk on `backend`. Never fails: errors are folded into
/// the returned result and reported.
pub async fn process_chunk(
    task: MaterializedChunk,
    provider: Provider,
    backend: Arc<dyn STTAdapter>,
    ctx: &WorkerContext,
    cancel: &CancellationToken,
) -> ChunkTranscriptionResult {
    let started = Instant::now();
    let chunk = task.chunk;

    tracing::debug!(
        "Chunk {} [{:.1}s - {:.1}s] dispatched to {}",
        chunk.index,
        chunk.start_time,
        chunk.end_time,
        provider
    );

    let outcome = transcribe_file(&task, provider, backend.as_ref(), &ctx.language, cancel).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(mut segments) => {
            for (i, segment) in segments.iter_mut().enumerate() {
                segment.rebase(chunk.start_time);
                segment.index = i;
            }

            tracing::info!(
                "Chunk {} completed by {}: {} segments in {}ms",
                chunk.index,
                provider,
                segments.len(),
                elapsed_ms
            );

            ctx.progress.apply(ProgressDelta::ChunkCompleted {
                chunk_index: chunk.index,
                provider,
                latest_segment: segments.last().cloned(),
            });

            ChunkTranscriptionResult::success(chunk, provider, segments, elapsed_ms)
        }
        Err(e) => fail_chunk(chunk, provider, ctx, e, elapsed_ms),
    }
}

/// Record a failed chunk: log it, report it, count it and build its result.
pub fn fail_chunk(
    chunk: AudioChunk,
    provider: Provider,
    ctx: &WorkerContext,
    error: ChunkError,
    elapsed_ms: u64,
) -> ChunkTranscriptionResult {
    let severity = error.severity();
    if severity == Severity::Info {
        tracing::info!(
            "Chunk {} on {} stopped after {}ms: {}",
            chunk.index,
            provider,
            elapsed_ms,
            error
        );
    } else {
        tracing::error!(
            "Chunk {} failed on {} after {}ms: {}",
            chunk.index,
            provider,
            elapsed_ms,
            error
        );
    }

    ctx.reporter.log_error(
        &error,
        "worker",
        severity,
        json!({
            "chunk_index": chunk.index,
            "provider": provider.to_string(),
            "job_id": ctx.job_id,
        }),
    );

    let message = error.to_string();
    ctx.progress.apply(ProgressDelta::ChunkFailed {
        chunk_index: chunk.index,
        provider,
        error: message.clone(),
    });

    ChunkTranscriptionResult::failure(chunk, provider, message, elapsed_ms)
}

async fn transcribe_file(
    task: &MaterializedChunk,
    provider: Provider,
    backend: &dyn STTAdapter,
    language: &str,
    cancel: &CancellationToken,
) -> Result<Vec<crate::stt::TranscriptionSegment>, ChunkError> {
    let audio = tokio::select! {
        _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
        read = tokio::fs::read(&task.path) => read?,
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
        result = backend.transcribe(&audio, language, cancel) => result,
    };

    match result {
        Ok(segments) => Ok(segments),
        Err(STTError::Cancelled) => Err(ChunkError::Cancelled),
        Err(source) => Err(ChunkError::Backend { provider, source }),
    }
}
