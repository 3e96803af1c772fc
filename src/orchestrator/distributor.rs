use super::availability::AvailabilityReport;
use super::provider_registry::BackendSet;
use super::worker::{fail_chunk, process_chunk, ChunkError, WorkerContext};
use super::OrchestratorError;
use crate::session::{ChunkTranscriptionResult, MaterializedChunk, Provider};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionStrategy {
    /// Even chunk indices go to OpenAI, odd ones to faster-whisper.
    #[default]
    RoundRobin,
    /// Whichever provider has fewer chunks in flight; ties go to OpenAI.
    LeastLoaded,
    /// Always the local faster-whisper server.
    FirstAvailable,
    /// Always OpenAI. Racing both providers per chunk would double the cost.
    Racing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionOptions {
    pub chunk_duration_seconds: f64,
    pub chunk_overlap_seconds: f64,
    pub max_parallel_per_provider: usize,
    pub strategy: DistributionStrategy,
}

impl Default for DistributionOptions {
    fn default() -> Self {
        Self {
            chunk_duration_seconds: 30.0,
            chunk_overlap_seconds: 2.0,
            max_parallel_per_provider: 2,
            strategy: DistributionStrategy::RoundRobin,
        }
    }
}

/// Both providers together must stay within the semaphore's permit limit.
pub const MAX_PARALLEL_PER_PROVIDER: usize = Semaphore::MAX_PERMITS / 2;

impl DistributionOptions {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if !(self.chunk_duration_seconds > 0.0) {
            return Err(OrchestratorError::Configuration(format!(
                "chunk duration must be positive (got {}s)",
                self.chunk_duration_seconds
            )));
        }
        if !(self.chunk_overlap_seconds >= 0.0) {
            return Err(OrchestratorError::Configuration(format!(
                "chunk overlap must not be negative (got {}s)",
                self.chunk_overlap_seconds
            )));
        }
        if self.chunk_overlap_seconds >= self.chunk_duration_seconds {
            return Err(OrchestratorError::Configuration(format!(
                "chunk overlap {}s must be smaller than chunk duration {}s",
                self.chunk_overlap_seconds, self.chunk_duration_seconds
            )));
        }
        if self.max_parallel_per_provider == 0 {
            return Err(OrchestratorError::Configuration(
                "max parallel chunks per provider must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_per_provider > MAX_PARALLEL_PER_PROVIDER {
            return Err(OrchestratorError::Configuration(format!(
                "max parallel chunks per provider must not exceed {} (got {})",
                MAX_PARALLEL_PER_PROVIDER, self.max_parallel_per_provider
            )));
        }
        Ok(())
    }
}

/// Chunks currently in flight per provider, for one job.
#[derive(Debug, Default)]
pub struct LoadTracker {
    open_ai: AtomicUsize,
    faster_whisper: AtomicUsize,
}

impl LoadTracker {
    fn counter(&self, provider: Provider) -> &AtomicUsize {
        match provider {
            Provider::OpenAi => &self.open_ai,
            Provider::FasterWhisper => &self.faster_whisper,
        }
    }

    pub fn in_flight(&self, provider: Provider) -> usize {
        self.counter(provider).load(Ordering::SeqCst)
    }

    pub fn begin(self: &Arc<Self>, provider: Provider) -> LoadGuard {
        self.counter(provider).fetch_add(1, Ordering::SeqCst);
        LoadGuard {
            tracker: Arc::clone(self),
            provider,
        }
    }
}

pub struct LoadGuard {
    tracker: Arc<LoadTracker>,
    provider: Provider,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.tracker
            .counter(self.provider)
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Concurrency budget: `max_parallel` per usable provider.
pub fn effective_parallelism(max_parallel_per_provider: usize, available: usize) -> usize {
    if available >= 2 {
        max_parallel_per_provider.saturating_mul(2)
    } else {
        max_parallel_per_provider
    }
}

/// Pick the provider for one chunk. `available` is in [`Provider::ALL`] order.
pub fn select_provider(
    strategy: DistributionStrategy,
    chunk_index: usize,
    available: &[Provider],
    load: &LoadTracker,
) -> Option<Provider> {
    match available {
        [] => None,
        [only] => Some(*only),
        _ => Some(match strategy {
            DistributionStrategy::RoundRobin => {
                if chunk_index % 2 == 0 {
                    Provider::OpenAi
                } else {
                    Provider::FasterWhisper
                }
            }
            DistributionStrategy::LeastLoaded => {
                if load.in_flight(Provider::FasterWhisper) < load.in_flight(Provider::OpenAi) {
                    Provider::FasterWhisper
                } else {
                    Provider::OpenAi
                }
            }
            DistributionStrategy::FirstAvailable => Provider::FasterWhisper,
            DistributionStrategy::Racing => Provider::OpenAi,
        }),
    }
}

/// Fans a job's chunks out to its backends under one shared slot budget.
pub struct Distributor {
    backends: BackendSet,
    available: Vec<Provider>,
    strategy: DistributionStrategy,
    parallelism: usize,
    semaphore: Arc<Semaphore>,
    load: Arc<LoadTracker>,
}

impl Distributor {
    pub fn new(
        backends: BackendSet,
        report: &AvailabilityReport,
        options: &DistributionOptions,
    ) -> Result<Self, OrchestratorError> {
        let available: Vec<Provider> = report
            .available_providers()
            .into_iter()
            .filter(|p| backends.get(*p).is_some())
            .collect();
        if available.is_empty() {
            return Err(OrchestratorError::NoBackendsAvailable {
                open_ai_status: report.open_ai_status.clone(),
                faster_whisper_status: report.faster_whisper_status.clone(),
            });
        }

        let parallelism = effective_parallelism(options.max_parallel_per_provider, available.len());
        tracing::info!(
            "Distributor ready: providers={:?}, strategy={:?}, parallelism={}",
            available,
            options.strategy,
            parallelism
        );

        Ok(Self {
            backends,
            available,
            strategy: options.strategy,
            parallelism,
            semaphore: Arc::new(Semaphore::new(parallelism)),
            load: Arc::new(LoadTracker::default()),
        })
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Slots not held by a worker right now.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Spawn one worker per chunk and stream results in completion order.
    ///
    /// The stream ends once every dispatched worker has finished and released
    /// its slot. After cancellation no further chunk is dispatched.
    pub fn distribute(
        &self,
        chunks: Vec<MaterializedChunk>,
        ctx: WorkerContext,
        cancel: CancellationToken,
    ) -> ReceiverStream<ChunkTranscriptionResult> {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));

        let backends = self.backends.clone();
        let available = self.available.clone();
        let strategy = self.strategy;
        let semaphore = Arc::clone(&self.semaphore);
        let load = Arc::clone(&self.load);

        tokio::spawn(async move {
            for task in chunks {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                if cancel.is_cancelled() {
                    break;
                }

                let index = task.chunk.index;
                let Some(provider) = select_provider(strategy, index, &available, &load) else {
                    break;
                };
                let Some(backend) = backends.get(provider).cloned() else {
                    break;
                };
                let guard = load.begin(provider);

                let tx = tx.clone();
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let chunk = task.chunk;
                    let started = Instant::now();
                    let worker = process_chunk(task, provider, backend, &ctx, &cancel);
                    let result = match AssertUnwindSafe(worker).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => fail_chunk(
                            chunk,
                            provider,
                            &ctx,
                            ChunkError::Panicked,
                            started.elapsed().as_millis() as u64,
                        ),
                    };
                    drop(guard);
                    drop(permit);
                    if tx.send(result).await.is_err() {
                        tracing::debug!("Result for chunk {} dropped: receiver gone", index);
                    }
                });
            }
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::availability::RecommendedStrategy;

    fn report(open_ai: bool, faster_whisper: bool) -> AvailabilityReport {
        AvailabilityReport {
            open_ai_available: open_ai,
            open_ai_status: String::new(),
            faster_whisper_available: faster_whisper,
            faster_whisper_status: String::new(),
            recommended_strategy: RecommendedStrategy::None,
        }
    }

    const BOTH: [Provider; 2] = [Provider::OpenAi, Provider::FasterWhisper];

    #[test]
    fn test_validate_options() {
        assert!(DistributionOptions::default().validate().is_ok());

        let bad = [
            (0.0, 0.0, 2),
            (-5.0, 0.0, 2),
            (30.0, 30.0, 2),
            (30.0, 45.0, 2),
            (30.0, -1.0, 2),
            (30.0, 2.0, 0),
        ];
        for (duration, overlap, parallel) in bad {
            let options = DistributionOptions {
                chunk_duration_seconds: duration,
                chunk_overlap_seconds: overlap,
                max_parallel_per_provider: parallel,
                strategy: DistributionStrategy::RoundRobin,
            };
            assert!(
                matches!(options.validate(), Err(OrchestratorError::Configuration(_))),
                "{:?} should be rejected",
                options
            );
        }
    }

    #[test]
    fn test_round_robin_parity() {
        let load = LoadTracker::default();
        for i in 0..10 {
            let expected = if i % 2 == 0 {
                Provider::OpenAi
            } else {
                Provider::FasterWhisper
            };
            assert_eq!(
                select_provider(DistributionStrategy::RoundRobin, i, &BOTH, &load),
                Some(expected)
            );
        }
    }

    #[test]
    fn test_single_provider_always_wins() {
        let load = LoadTracker::default();
        for strategy in [
            DistributionStrategy::RoundRobin,
            DistributionStrategy::LeastLoaded,
            DistributionStrategy::FirstAvailable,
            DistributionStrategy::Racing,
        ] {
            for i in 0..4 {
                assert_eq!(
                    select_provider(strategy, i, &[Provider::FasterWhisper], &load),
                    Some(Provider::FasterWhisper)
                );
            }
        }
        assert_eq!(
            select_provider(DistributionStrategy::RoundRobin, 0, &[], &load),
            None
        );
    }

    #[test]
    fn test_fixed_strategies() {
        let load = LoadTracker::default();
        assert_eq!(
            select_provider(DistributionStrategy::FirstAvailable, 0, &BOTH, &load),
            Some(Provider::FasterWhisper)
        );
        assert_eq!(
            select_provider(DistributionStrategy::Racing, 1, &BOTH, &load),
            Some(Provider::OpenAi)
        );
    }

    #[test]
    fn test_least_loaded_follows_in_flight_counts() {
        fn pick(load: &LoadTracker) -> Option<Provider> {
            select_provider(DistributionStrategy::LeastLoaded, 0, &BOTH, load)
        }

        let load = Arc::new(LoadTracker::default());

        assert_eq!(pick(&load), Some(Provider::OpenAi));
        let a = load.begin(Provider::OpenAi);
        assert_eq!(pick(&load), Some(Provider::FasterWhisper));
        let b = load.begin(Provider::FasterWhisper);
        assert_eq!(pick(&load), Some(Provider::OpenAi));
        drop(a);
        assert_eq!(load.in_flight(Provider::OpenAi), 0);
        assert_eq!(pick(&load), Some(Provider::OpenAi));
        drop(b);
        assert_eq!(load.in_flight(Provider::FasterWhisper), 0);
    }

    #[test]
    fn test_effective_parallelism() {
        assert_eq!(effective_parallelism(2, 2), 4);
        assert_eq!(effective_parallelism(3, 1), 3);
        assert_eq!(effective_parallelism(usize::MAX, 2), usize::MAX);
    }

    #[test]
    fn test_validate_caps_parallelism_to_semaphore_limit() {
        let mut options = DistributionOptions {
            max_parallel_per_provider: MAX_PARALLEL_PER_PROVIDER,
            ..DistributionOptions::default()
        };
        assert!(options.validate().is_ok());
        assert!(effective_parallelism(options.max_parallel_per_provider, 2) <= Semaphore::MAX_PERMITS);

        for too_many in [MAX_PARALLEL_PER_PROVIDER + 1, usize::MAX >> 4, usize::MAX] {
            options.max_parallel_per_provider = too_many;
            assert!(matches!(
                options.validate(),
                Err(OrchestratorError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_distributor_requires_a_backend() {
        let err = Distributor::new(
            BackendSet::default(),
            &report(true, true),
            &DistributionOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, OrchestratorError::NoBackendsAvailable { .. }));
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&DistributionStrategy::LeastLoaded).unwrap();
        assert_eq!(json, "\"LeastLoaded\"");
        let parsed: DistributionStrategy = serde_json::from_str("\"Racing\"").unwrap();
        assert_eq!(parsed, DistributionStrategy::Racing);
    }
}
