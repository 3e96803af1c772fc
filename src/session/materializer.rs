use super::AudioChunk;
use crate::media::{MediaError, MediaToolkit};
use crate::reporting::{ErrorReporter, Severity};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

const SOURCE_FILE: &str = "source.media";
const AUDIO_FILE: &str = "audio.wav";
const CHUNKS_DIR: &str = "chunks";

/// A planned window together with the standalone WAV cut for it.
#[derive(Debug, Clone)]
pub struct MaterializedChunk {
    pub chunk: AudioChunk,
    pub path: PathBuf,
}

/// Temp directory owned by exactly one job.
///
/// Every intermediate file of the job lives under it. The directory is
/// removed by [`JobWorkspace::close`], or on drop if the job unwinds early.
pub struct JobWorkspace {
    job_id: String,
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create(temp_root: Option<&Path>, job_id: &str) -> Result<Self, MediaError> {
        let prefix = format!("transcribe-{}-", job_id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        std::fs::create_dir(dir.path().join(CHUNKS_DIR))?;

        tracing::debug!("Job {} workspace: {}", job_id, dir.path().display());
        Ok(Self {
            job_id: job_id.to_string(),
            dir,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> PathBuf {
        self.path().join(SOURCE_FILE)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.path().join(AUDIO_FILE)
    }

    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.path()
            .join(CHUNKS_DIR)
            .join(format!("chunk_{:04}.wav", index))
    }

    /// Copy the caller's byte stream into the workspace.
    pub async fn spool_source<R>(
        &self,
        source: &mut R,
        cancel: &CancellationToken,
    ) -> Result<u64, MediaError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let path = self.source_path();
        let mut file = tokio::fs::File::create(&path).await?;

        let written = tokio::select! {
            _ = cancel.cancelled() => return Err(MediaError::Cancelled),
            copied = tokio::io::copy(source, &mut file) => copied?,
        };
        file.flush().await?;

        tracing::info!("Job {}: spooled {} bytes of source media", self.job_id, written);
        Ok(written)
    }

    /// Extract the audio track of the spooled source and return its duration.
    pub async fn prepare_audio(
        &self,
        toolkit: &dyn MediaToolkit,
        cancel: &CancellationToken,
    ) -> Result<f64, MediaError> {
        let audio = self.audio_path();
        toolkit
            .extract_audio(&self.source_path(), &audio, cancel)
            .await?;
        let duration = toolkit.probe_duration(&audio, cancel).await?;

        tracing::info!("Job {}: extracted {:.1}s of audio", self.job_id, duration);
        Ok(duration)
    }

    /// Cut one WAV file per planned window.
    pub async fn materialize_chunks(
        &self,
        toolkit: &dyn MediaToolkit,
        chunks: &[AudioChunk],
        cancel: &CancellationToken,
    ) -> Result<Vec<MaterializedChunk>, MediaError> {
        let audio = self.audio_path();
        let mut materialized = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled);
            }
            let path = self.chunk_path(chunk.index);
            toolkit
                .cut_chunk(&audio, chunk.start_time, chunk.duration, &path, cancel)
                .await?;
            materialized.push(MaterializedChunk {
                chunk: *chunk,
                path,
            });
        }

        tracing::info!(
            "Job {}: materialized {} chunk files",
            self.job_id,
            materialized.len()
        );
        Ok(materialized)
    }

    /// Remove the workspace. Failures are reported, never raised.
    pub fn close(self, reporter: &dyn ErrorReporter) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!("Failed to remove workspace {}: {}", path.display(), e);
            reporter.log_error(
                &e,
                "materializer",
                Severity::Warning,
                json!({ "job_id": self.job_id, "path": path.display().to_string() }),
            );
        } else {
            tracing::debug!("Job {} workspace removed", self.job_id);
        }
    }
}
