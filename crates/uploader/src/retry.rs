//! Retry with exponential backoff.

use buildstash_core::config::TransferConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often, and how patiently, to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. Always at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every attempt after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(config: &TransferConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay(),
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Outcome of a failed attempt.
pub enum Attempt<E> {
    /// Worth trying again.
    Retry(E),
    /// Give up immediately.
    Abort(E),
}

/// Why [`retry`] stopped without a value.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last error and the number of attempts made.
    Exhausted { error: E, attempts: u32 },
    Cancelled,
}

/// Run `op` until it succeeds, returns [`Attempt::Abort`], runs out of
/// attempts, or `cancel` fires. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = op(attempt) => outcome,
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(Attempt::Abort(error)) => {
                return Err(RetryError::Exhausted { error, attempts: attempt });
            }
            Err(Attempt::Retry(error)) => error,
        };

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted { error, attempts: attempt });
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
