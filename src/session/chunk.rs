use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trailing windows shorter than this are folded into their predecessor.
pub const MIN_CHUNK_SECONDS: f64 = 5.0;

/// One time window of the source audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

impl AudioChunk {
    pub fn new(index: usize, start_time: f64, end_time: f64) -> Self {
        Self {
            index,
            start_time,
            end_time,
            duration: end_time - start_time,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("chunk duration must be positive (got {0}s)")]
    NonPositiveChunk(f64),

    #[error("overlap {overlap}s must be smaller than chunk duration {chunk}s")]
    OverlapTooLarge { chunk: f64, overlap: f64 },

    #[error("overlap must not be negative (got {0}s)")]
    NegativeOverlap(f64),
}

/// Split `[0, total_duration]` into overlapping windows.
///
/// Windows start every `chunk_duration - overlap` seconds and are clipped to
/// the end of the recording. A final window shorter than
/// [`MIN_CHUNK_SECONDS`] is dropped and its span given to the previous one.
pub fn plan_chunks(
    total_duration: f64,
    chunk_duration: f64,
    overlap: f64,
) -> Result<Vec<AudioChunk>, PlanError> {
    if !(chunk_duration > 0.0) {
        return Err(PlanError::NonPositiveChunk(chunk_duration));
    }
    if overlap < 0.0 {
        return Err(PlanError::NegativeOverlap(overlap));
    }
    let stride = chunk_duration - overlap;
    if !(stride > 0.0) {
        return Err(PlanError::OverlapTooLarge {
            chunk: chunk_duration,
            overlap,
        });
    }

    let mut chunks: Vec<AudioChunk> = Vec::new();
    if !(total_duration > 0.0) {
        return Ok(chunks);
    }

    let mut step = 0usize;
    loop {
        let start_time = step as f64 * stride;
        if start_time >= total_duration {
            break;
        }
        let end_time = (start_time + chunk_duration).min(total_duration);

        let is_final = end_time >= total_duration;
        if is_final && end_time - start_time < MIN_CHUNK_SECONDS {
            if let Some(previous) = chunks.last_mut() {
                previous.end_time = total_duration;
                previous.duration = previous.end_time - previous.start_time;
                break;
            }
        }

        chunks.push(AudioChunk::new(chunks.len(), start_time, end_time));
        step += 1;
    }

    Ok(chunks)
}
