// src/stt/faster_whisper.rs
// faster-whisper server STT Adapter (self-hosted provider)

use super::retry::RetryPolicy;
use super::whisper_api::{self, TranscriptionRequest, TRANSCRIPTIONS_PATH};
use super::{STTAdapter, STTError, TranscriptionSegment};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "http://faster-whisper-service:8000";
pub const DEFAULT_MODEL: &str = "base";
const DEFAULT_CONFIDENCE: f32 = 0.8;
const HEALTH_TIMEOUT_SECS: u64 = 5;

pub struct FasterWhisperAdapter {
    base_url: String,
    model: String,
    client: reqwest::Client,
    health_client: reqwest::Client,
    retry: RetryPolicy,
}

impl FasterWhisperAdapter {
    pub fn new(
        base_url: &str,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, STTError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| STTError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;
        let health_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .build()
            .map_err(|e| STTError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();

        tracing::info!(
            "faster-whisper adapter initialized: base_url={}, model={}",
            base_url,
            model
        );

        Ok(Self {
            base_url,
            model: model.to_string(),
            client,
            health_client,
            retry,
        })
    }
}

#[async_trait]
impl STTAdapter for FasterWhisperAdapter {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptionSegment>, STTError> {
        if audio.is_empty() {
            return Err(STTError::InvalidAudio);
        }

        tracing::debug!(
            "faster-whisper: transcribing {}KB audio, language={}",
            audio.len() / 1024,
            language
        );

        let url = format!("{}{}", self.base_url, TRANSCRIPTIONS_PATH);
        let request = TranscriptionRequest {
            url: &url,
            bearer_token: None,
            model: &self.model,
            language,
            default_confidence: DEFAULT_CONFIDENCE,
        };

        whisper_api::send_with_retry(
            &self.client,
            &request,
            audio,
            &self.retry,
            cancel,
            self.name(),
        )
        .await
    }

    /// `/health` first, then the OpenAI-compatible `/v1/models` listing.
    async fn check_health(&self) -> Result<String, STTError> {
        let health = self
            .health_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| STTError::NetworkError(format!("Connection failed: {}", e)))?;

        if health.status().is_success() {
            return Ok(format!("Connected ({})", self.base_url));
        }

        let models = self
            .health_client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(|e| STTError::NetworkError(format!("Connection failed: {}", e)))?;

        if models.status().is_success() {
            Ok(format!("Connected ({})", self.base_url))
        } else {
            Err(STTError::ProviderError(format!("HTTP {}", models.status())))
        }
    }

    fn name(&self) -> &str {
        "faster-whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: &str) -> FasterWhisperAdapter {
        FasterWhisperAdapter::new(
            base_url,
            DEFAULT_MODEL,
            Duration::from_secs(5),
            RetryPolicy::new(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let status = adapter(&server.uri()).check_health().await.unwrap();
        assert_eq!(status, format!("Connected ({})", server.uri()));
    }

    #[tokio::test]
    async fn test_health_falls_back_to_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        assert!(adapter(&server.uri()).check_health().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter(&server.uri()).check_health().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_transcribe_uses_fallback_confidence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "duration": 2.0,
                "segments": [{"id": 0, "start": 0.5, "end": 2.0, "text": "ciao", "avg_logprob": -1.4}]
            })))
            .mount(&server)
            .await;

        let segments = adapter(&server.uri())
            .transcribe(b"RIFF", "it-IT", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(segments[0].text, "ciao");
        assert_eq!(segments[0].confidence, DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_server_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .transcribe(b"RIFF", "en", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, STTError::ProviderError(ref m) if m.contains("boom")));
    }
}
