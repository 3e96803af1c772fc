//! Parallel multi-provider transcription.
//!
//! A recording is cut into overlapping windows, fanned out to OpenAI Whisper
//! and a self-hosted faster-whisper server under a bounded slot budget, and
//! stitched back into one time-ordered transcript. Chunks that fail on their
//! backend become documented gaps instead of failing the job.

pub mod config;
pub mod media;
pub mod orchestrator;
pub mod reporting;
pub mod session;
pub mod stt;

pub use config::{ConfigError, TranscriberConfig};
pub use media::{FfmpegToolkit, MediaError, MediaToolkit};
pub use orchestrator::{
    AvailabilityReport, BackendSet, DistributionOptions, DistributionStrategy,
    OrchestratorError, ParallelTranscriber, RecommendedStrategy,
};
pub use reporting::{ErrorReporter, Severity, TracingErrorReporter};
pub use session::{
    AudioChunk, ChunkTranscriptionResult, CoverageGap, FinalTranscript, ProgressObserver,
    ProgressSnapshot, Provider,
};
pub use stt::{STTAdapter, STTError, TranscriptionSegment};
