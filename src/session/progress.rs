use super::Provider;
use crate::stt::TranscriptionSegment;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderCounts {
    pub open_ai: usize,
    pub faster_whisper: usize,
}

impl ProviderCounts {
    pub fn get(&self, provider: Provider) -> usize {
        match provider {
            Provider::OpenAi => self.open_ai,
            Provider::FasterWhisper => self.faster_whisper,
        }
    }

    fn increment(&mut self, provider: Provider) {
        match provider {
            Provider::OpenAi => self.open_ai += 1,
            Provider::FasterWhisper => self.faster_whisper += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub failed_chunks: usize,
    pub per_provider_completed: ProviderCounts,
    pub status_message: String,
    pub latest_segment: Option<TranscriptionSegment>,
}

impl ProgressSnapshot {
    /// Processed (completed or failed) chunks as an integer percentage.
    pub fn progress_percentage(&self) -> u8 {
        if self.total_chunks == 0 {
            return 0;
        }
        let processed = (self.completed_chunks + self.failed_chunks).min(self.total_chunks);
        (processed * 100 / self.total_chunks) as u8
    }

    pub fn is_finished(&self) -> bool {
        self.completed_chunks + self.failed_chunks >= self.total_chunks
    }
}

/// The outcome of one chunk, applied to the job's progress in a single step.
#[derive(Debug, Clone)]
pub enum ProgressDelta {
    ChunkCompleted {
        chunk_index: usize,
        provider: Provider,
        latest_segment: Option<TranscriptionSegment>,
    },
    ChunkFailed {
        chunk_index: usize,
        provider: Provider,
        error: String,
    },
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Per-job progress state shared by every chunk worker.
///
/// [`ProgressTracker::apply`] is the only mutation; it updates every field
/// of the snapshot under one lock so readers never see a half-applied chunk.
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ProgressTracker {
    pub fn new(total_chunks: usize, observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            state: Mutex::new(ProgressSnapshot {
                total_chunks,
                status_message: format!("Transcribing {} chunks", total_chunks),
                ..ProgressSnapshot::default()
            }),
            observer,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().clone()
    }

    pub fn apply(&self, delta: ProgressDelta) -> ProgressSnapshot {
        let snapshot = {
            let mut state = self.state.lock();
            match delta {
                ProgressDelta::ChunkCompleted {
                    chunk_index,
                    provider,
                    latest_segment,
                } => {
                    state.completed_chunks += 1;
                    state.per_provider_completed.increment(provider);
                    state.status_message = format!(
                        "Chunk {}/{} completed by {}",
                        chunk_index + 1,
                        state.total_chunks,
                        provider
                    );
                    if latest_segment.is_some() {
                        state.latest_segment = latest_segment;
                    }
                }
                ProgressDelta::ChunkFailed {
                    chunk_index,
                    provider,
                    error,
                } => {
                    state.failed_chunks += 1;
                    state.status_message = format!(
                        "Chunk {}/{} failed on {}: {}",
                        chunk_index + 1,
                        state.total_chunks,
                        provider,
                        error
                    );
                }
            }
            state.clone()
        };

        if let Some(observer) = &self.observer {
            observer.on_progress(&snapshot);
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn completed(index: usize, provider: Provider) -> ProgressDelta {
        ProgressDelta::ChunkCompleted {
            chunk_index: index,
            provider,
            latest_segment: Some(TranscriptionSegment::new(0, 0.0, 1.0, "x", 0.9)),
        }
    }

    #[test]
    fn test_apply_updates_counters_together() {
        let tracker = ProgressTracker::new(4, None);
        tracker.apply(completed(0, Provider::OpenAi));
        tracker.apply(completed(1, Provider::FasterWhisper));
        let snap = tracker.apply(ProgressDelta::ChunkFailed {
            chunk_index: 2,
            provider: Provider::OpenAi,
            error: "timeout".into(),
        });

        assert_eq!(snap.completed_chunks, 2);
        assert_eq!(snap.failed_chunks, 1);
        assert_eq!(snap.per_provider_completed.get(Provider::OpenAi), 1);
        assert_eq!(snap.per_provider_completed.get(Provider::FasterWhisper), 1);
        assert_eq!(snap.progress_percentage(), 75);
        assert!(snap.status_message.contains("failed"));
        assert!(!snap.is_finished());
    }

    #[test]
    fn test_observer_sees_every_delta() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let observer: Arc<dyn ProgressObserver> = Arc::new(move |snap: &ProgressSnapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(snap.completed_chunks <= snap.total_chunks);
        });

        let tracker = ProgressTracker::new(2, Some(observer));
        tracker.apply(completed(1, Provider::OpenAi));
        tracker.apply(completed(0, Provider::OpenAi));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(tracker.snapshot().is_finished());
        assert_eq!(tracker.snapshot().progress_percentage(), 100);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let tracker = Arc::new(ProgressTracker::new(800, None));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let provider = if t % 2 == 0 {
                            Provider::OpenAi
                        } else {
                            Provider::FasterWhisper
                        };
                        tracker.apply(completed(t * 100 + i, provider));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = tracker.snapshot();
        assert_eq!(snap.completed_chunks, 800);
        assert_eq!(
            snap.per_provider_completed.open_ai + snap.per_provider_completed.faster_whisper,
            800
        );
    }

    #[test]
    fn test_empty_job_reports_zero_percent() {
        assert_eq!(ProgressTracker::new(0, None).snapshot().progress_percentage(), 0);
    }
}
