use crate::stt::STTError;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Per-backend retry policy with exponential backoff.
///
/// Retries live inside the backend client; the orchestrator never
/// re-dispatches a failed chunk.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u8,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u8) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(2),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    pub fn should_retry(&self, attempt: u8, error: &STTError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        error.is_retryable()
    }

    pub fn delay_for(&self, attempt: u8) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        self.base_delay.saturating_mul(multiplier)
    }

    /// Sleep before the next attempt. Returns `Err(Cancelled)` if the job is
    /// cancelled while waiting.
    pub async fn wait_before_retry(
        &self,
        attempt: u8,
        cancel: &CancellationToken,
    ) -> Result<(), STTError> {
        let delay = self.delay_for(attempt);

        tracing::info!(
            "Retrying in {}ms (attempt {})",
            delay.as_millis(),
            attempt + 2
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(STTError::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }
}
