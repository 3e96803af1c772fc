use crate::config::TranscriberConfig;
use crate::session::Provider;
use crate::stt::{FasterWhisperAdapter, OpenAIWhisperAdapter, RetryPolicy, STTAdapter, STTError};
use std::sync::Arc;
use std::time::Duration;

/// The backends a job may use, one slot per [`Provider`].
#[derive(Clone, Default)]
pub struct BackendSet {
    pub open_ai: Option<Arc<dyn STTAdapter>>,
    pub faster_whisper: Option<Arc<dyn STTAdapter>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Provider, adapter: Arc<dyn STTAdapter>) -> Self {
        match provider {
            Provider::OpenAi => self.open_ai = Some(adapter),
            Provider::FasterWhisper => self.faster_whisper = Some(adapter),
        }
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn STTAdapter>> {
        match provider {
            Provider::OpenAi => self.open_ai.as_ref(),
            Provider::FasterWhisper => self.faster_whisper.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open_ai.is_none() && self.faster_whisper.is_none()
    }
}

/// Build both HTTP adapters from configuration.
///
/// OpenAI is registered even without a key; its health check then reports it
/// unavailable, which keeps the reason visible in the availability report.
pub fn build_backends(config: &TranscriberConfig) -> Result<BackendSet, STTError> {
    let openai = OpenAIWhisperAdapter::new(
        config.openai.api_key.clone(),
        &config.openai.base_url,
        &config.openai.model,
        Duration::from_secs(config.openai.timeout_secs),
        RetryPolicy::new(config.openai.max_retries),
    )?;

    let faster_whisper = FasterWhisperAdapter::new(
        &config.faster_whisper.base_url,
        &config.faster_whisper.model,
        Duration::from_secs(config.faster_whisper.timeout_secs),
        RetryPolicy::new(config.faster_whisper.max_retries),
    )?;

    Ok(BackendSet::new()
        .with(Provider::OpenAi, Arc::new(openai))
        .with(Provider::FasterWhisper, Arc::new(faster_whisper)))
}
