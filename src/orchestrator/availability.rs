use super::provider_registry::BackendSet;
use crate::reporting::{ErrorReporter, Severity};
use crate::session::Provider;
use crate::stt::{STTAdapter, STTError};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const NOT_CONFIGURED: &str = "Not configured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecommendedStrategy {
    #[serde(rename = "RoundRobin")]
    RoundRobin,
    #[serde(rename = "OpenAI-only")]
    OpenAiOnly,
    #[serde(rename = "FasterWhisper-only")]
    FasterWhisperOnly,
    #[serde(rename = "none")]
    None,
}

impl RecommendedStrategy {
    fn from_flags(open_ai: bool, faster_whisper: bool) -> Self {
        match (open_ai, faster_whisper) {
            (true, true) => RecommendedStrategy::RoundRobin,
            (true, false) => RecommendedStrategy::OpenAiOnly,
            (false, true) => RecommendedStrategy::FasterWhisperOnly,
            (false, false) => RecommendedStrategy::None,
        }
    }
}

impl fmt::Display for RecommendedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecommendedStrategy::RoundRobin => "RoundRobin",
            RecommendedStrategy::OpenAiOnly => "OpenAI-only",
            RecommendedStrategy::FasterWhisperOnly => "FasterWhisper-only",
            RecommendedStrategy::None => "none",
        };
        f.write_str(label)
    }
}

/// Which backends answered their health probe for this job.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub open_ai_available: bool,
    pub open_ai_status: String,
    pub faster_whisper_available: bool,
    pub faster_whisper_status: String,
    pub recommended_strategy: RecommendedStrategy,
}

impl AvailabilityReport {
    pub fn is_available(&self, provider: Provider) -> bool {
        match provider {
            Provider::OpenAi => self.open_ai_available,
            Provider::FasterWhisper => self.faster_whisper_available,
        }
    }

    pub fn available_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.is_available(*p))
            .collect()
    }

    pub fn any_available(&self) -> bool {
        self.recommended_strategy != RecommendedStrategy::None
    }
}

/// Probe both backends concurrently. One probe failing or hanging never
/// affects the other.
pub async fn probe_availability(
    backends: &BackendSet,
    probe_timeout: Duration,
    reporter: &dyn ErrorReporter,
) -> AvailabilityReport {
    let (open_ai, faster_whisper) = tokio::join!(
        probe_one(Provider::OpenAi, backends.open_ai.as_ref(), probe_timeout, reporter),
        probe_one(
            Provider::FasterWhisper,
            backends.faster_whisper.as_ref(),
            probe_timeout,
            reporter
        ),
    );

    let report = AvailabilityReport {
        open_ai_available: open_ai.0,
        open_ai_status: open_ai.1,
        faster_whisper_available: faster_whisper.0,
        faster_whisper_status: faster_whisper.1,
        recommended_strategy: RecommendedStrategy::from_flags(open_ai.0, faster_whisper.0),
    };

    tracing::info!(
        "Availability: OpenAI={} ({}), FasterWhisper={} ({}), recommended={}",
        report.open_ai_available,
        report.open_ai_status,
        report.faster_whisper_available,
        report.faster_whisper_status,
        report.recommended_strategy
    );

    report
}

async fn probe_one(
    provider: Provider,
    adapter: Option<&Arc<dyn STTAdapter>>,
    probe_timeout: Duration,
    reporter: &dyn ErrorReporter,
) -> (bool, String) {
    let Some(adapter) = adapter else {
        return (false, NOT_CONFIGURED.to_string());
    };

    let outcome = match tokio::time::timeout(probe_timeout, adapter.check_health()).await {
        Ok(result) => result,
        Err(_) => Err(STTError::TimeoutError),
    };

    match outcome {
        Ok(status) => (true, status),
        Err(e) => {
            tracing::warn!("{} availability probe failed: {}", provider, e);
            reporter.log_error(
                &e,
                "availability",
                Severity::Warning,
                json!({ "provider": provider.to_string() }),
            );
            (false, status_from_error(&e))
        }
    }
}

fn status_from_error(error: &STTError) -> String {
    match error {
        STTError::NotConfigured(msg)
        | STTError::ProviderError(msg)
        | STTError::NetworkError(msg) => msg.clone(),
        STTError::TimeoutError => "Health check timed out".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::TracingErrorReporter;
    use crate::stt::TranscriptionSegment;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    enum Health {
        Up,
        Down,
        Hang,
    }

    struct ProbeOnly(Health);

    #[async_trait]
    impl STTAdapter for ProbeOnly {
        async fn transcribe(
            &self,
            _audio: &[u8],
            _language: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<TranscriptionSegment>, STTError> {
            Ok(Vec::new())
        }

        async fn check_health(&self) -> Result<String, STTError> {
            match self.0 {
                Health::Up => Ok("ok".to_string()),
                Health::Down => Err(STTError::ProviderError("HTTP 503".to_string())),
                Health::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("late".to_string())
                }
            }
        }

        fn name(&self) -> &str {
            "probe-only"
        }
    }

    fn set(a: Option<Health>, b: Option<Health>) -> BackendSet {
        BackendSet {
            open_ai: a.map(|h| Arc::new(ProbeOnly(h)) as Arc<dyn STTAdapter>),
            faster_whisper: b.map(|h| Arc::new(ProbeOnly(h)) as Arc<dyn STTAdapter>),
        }
    }

    async fn probe(backends: BackendSet) -> AvailabilityReport {
        probe_availability(&backends, Duration::from_millis(200), &TracingErrorReporter).await
    }

    #[tokio::test]
    async fn test_both_available_recommends_round_robin() {
        let report = probe(set(Some(Health::Up), Some(Health::Up))).await;
        assert_eq!(report.recommended_strategy, RecommendedStrategy::RoundRobin);
        assert_eq!(report.recommended_strategy.to_string(), "RoundRobin");
        assert_eq!(report.available_providers().len(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_affect_the_other() {
        let report = probe(set(Some(Health::Down), Some(Health::Up))).await;
        assert!(!report.open_ai_available);
        assert_eq!(report.open_ai_status, "HTTP 503");
        assert!(report.faster_whisper_available);
        assert_eq!(report.recommended_strategy.to_string(), "FasterWhisper-only");
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out() {
        let report = probe(set(Some(Health::Up), Some(Health::Hang))).await;
        assert!(report.open_ai_available);
        assert!(!report.faster_whisper_available);
        assert_eq!(report.faster_whisper_status, "Health check timed out");
        assert_eq!(report.recommended_strategy.to_string(), "OpenAI-only");
    }

    #[tokio::test]
    async fn test_nothing_configured_is_none() {
        let report = probe(set(None, None)).await;
        assert_eq!(report.open_ai_status, "Not configured");
        assert!(!report.any_available());
        assert_eq!(report.recommended_strategy.to_string(), "none");
        assert_eq!(
            serde_json::to_value(&report).unwrap()["recommended_strategy"],
            "none"
        );
    }
}
