// src/orchestrator/mod.rs
// Parallel transcription job: probe, materialize, distribute, merge

use crate::config::{TranscriberConfig, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::media::{FfmpegToolkit, MediaError, MediaToolkit};
use crate::reporting::{ErrorReporter, TracingErrorReporter};
use crate::session::{
    plan_chunks, FinalTranscript, JobWorkspace, MergeContext, ProgressObserver, ProgressTracker,
    Stitcher,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod availability;
pub mod distributor;
pub mod provider_registry;
pub mod worker;

pub use availability::{probe_availability, AvailabilityReport, RecommendedStrategy};
pub use distributor::{
    effective_parallelism, select_provider, DistributionOptions, DistributionStrategy,
    Distributor,
};
pub use provider_registry::{build_backends, BackendSet};
pub use worker::{process_chunk, ChunkError, WorkerContext};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("No transcription backend available (OpenAI: {open_ai_status}; FasterWhisper: {faster_whisper_status})")]
    NoBackendsAvailable {
        open_ai_status: String,
        faster_whisper_status: String,
    },

    #[error("Audio extraction failed: {0}")]
    Extraction(MediaError),

    #[error("Transcription cancelled")]
    Cancelled,

    #[error("Transcription timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<MediaError> for OrchestratorError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => OrchestratorError::Cancelled,
            other => OrchestratorError::Extraction(other),
        }
    }
}

/// Entry point for transcription jobs.
///
/// Holds only long-lived collaborators; every job gets its own workspace,
/// slot budget, progress state and result map.
pub struct ParallelTranscriber {
    backends: BackendSet,
    media: Arc<dyn MediaToolkit>,
    reporter: Arc<dyn ErrorReporter>,
    temp_root: Option<PathBuf>,
    job_timeout: Duration,
    probe_timeout: Duration,
}

impl ParallelTranscriber {
    pub fn new(backends: BackendSet, media: Arc<dyn MediaToolkit>) -> Self {
        Self {
            backends,
            media,
            reporter: Arc::new(TracingErrorReporter),
            temp_root: None,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &TranscriberConfig) -> Result<Self, OrchestratorError> {
        let backends =
            build_backends(config).map_err(|e| OrchestratorError::Configuration(e.to_string()))?;
        let media = FfmpegToolkit::new(&config.media.ffmpeg_bin, &config.media.ffprobe_bin);

        let mut transcriber = Self::new(backends, Arc::new(media))
            .with_job_timeout(config.job.timeout())
            .with_probe_timeout(config.job.probe_timeout());
        if let Some(dir) = &config.job.temp_dir {
            transcriber = transcriber.with_temp_dir(dir.clone());
        }
        Ok(transcriber)
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub async fn check_availability(&self) -> AvailabilityReport {
        probe_availability(&self.backends, self.probe_timeout, self.reporter.as_ref()).await
    }

    /// Transcribe `source` (any audio or video container the media toolkit
    /// understands).
    ///
    /// Per-chunk failures never fail the job; they show up as gaps in the
    /// returned transcript. The job workspace is removed before returning on
    /// every path.
    pub async fn transcribe<R>(
        &self,
        source: &mut R,
        language: &str,
        options: &DistributionOptions,
        observer: Option<Arc<dyn ProgressObserver>>,
        cancel: &CancellationToken,
    ) -> Result<FinalTranscript, OrchestratorError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        options.validate()?;

        let report = self.check_availability().await;
        if !report.any_available() {
            tracing::error!("No transcription backend available, refusing job");
            return Err(OrchestratorError::NoBackendsAvailable {
                open_ai_status: report.open_ai_status,
                faster_whisper_status: report.faster_whisper_status,
            });
        }

        let job_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        tracing::info!(
            "Job {} started: language={}, strategy={:?}, chunk={}s, overlap={}s",
            job_id,
            language,
            options.strategy,
            options.chunk_duration_seconds,
            options.chunk_overlap_seconds
        );

        let workspace = JobWorkspace::create(self.temp_root.as_deref(), &job_id)?;
        let job_token = cancel.child_token();

        let outcome = {
            let run = self.run_job(
                &workspace,
                source,
                language,
                options,
                &report,
                observer,
                &job_token,
            );
            tokio::pin!(run);

            tokio::select! {
                outcome = &mut run => outcome,
                _ = tokio::time::sleep(self.job_timeout) => {
                    tracing::warn!("Job {} exceeded {:?}, cancelling", job_id, self.job_timeout);
                    job_token.cancel();
                    // Let in-flight workers observe the cancellation and drain.
                    let _ = (&mut run).await;
                    Err(OrchestratorError::TimedOut(self.job_timeout))
                }
            }
        };

        workspace.close(self.reporter.as_ref());

        match &outcome {
            Ok(transcript) => tracing::info!(
                "Job {} finished in {:.1}s: {} segments, {} gaps, model={}",
                job_id,
                started.elapsed().as_secs_f64(),
                transcript.segments.len(),
                transcript.gaps.len(),
                transcript.model_identifier
            ),
            Err(e) => tracing::error!("Job {} failed: {}", job_id, e),
        }

        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_job<R>(
        &self,
        workspace: &JobWorkspace,
        source: &mut R,
        language: &str,
        options: &DistributionOptions,
        report: &AvailabilityReport,
        observer: Option<Arc<dyn ProgressObserver>>,
        cancel: &CancellationToken,
    ) -> Result<FinalTranscript, OrchestratorError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let job_id = workspace.job_id().to_string();

        workspace.spool_source(source, cancel).await?;
        let total_duration = workspace.prepare_audio(self.media.as_ref(), cancel).await?;

        let plan = plan_chunks(
            total_duration,
            options.chunk_duration_seconds,
            options.chunk_overlap_seconds,
        )
        .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;
        tracing::info!(
            "Job {}: {:.1}s of audio planned into {} chunks",
            job_id,
            total_duration,
            plan.len()
        );

        let chunks = workspace
            .materialize_chunks(self.media.as_ref(), &plan, cancel)
            .await?;

        let distributor = Distributor::new(self.backends.clone(), report, options)?;
        let ctx = WorkerContext {
            job_id: job_id.clone(),
            language: language.to_string(),
            progress: Arc::new(ProgressTracker::new(chunks.len(), observer)),
            reporter: Arc::clone(&self.reporter),
        };

        let mut results = HashMap::with_capacity(chunks.len());
        let mut stream = distributor.distribute(chunks, ctx, cancel.clone());
        while let Some(result) = stream.next().await {
            results.insert(result.chunk_index, result);
        }

        if cancel.is_cancelled() {
            tracing::warn!(
                "Job {} cancelled with {}/{} chunks finished",
                job_id,
                results.len(),
                plan.len()
            );
            return Err(OrchestratorError::Cancelled);
        }

        let context = MergeContext {
            job_id,
            language: language.to_string(),
        };
        Ok(Stitcher::merge(&results, total_duration, &context))
    }
}
