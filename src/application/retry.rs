//! Backoff loop for provider calls.

use crate::config::GatewayConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Attempt budget and delay bounds, derived from [`GatewayConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for RetryConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            // The first call always happens
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt failed with a transient error; `error` is the last one.
    Exhausted { attempts: u32, error: E },
    PermanentFailure(E),
}

/// Classifies a failure as worth another attempt.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Calls `call` with the 1-based attempt number until it succeeds, returns a
/// non-transient error or uses up `max_attempts`. The pause between attempts
/// starts at `initial_delay` and doubles up to `max_delay`.
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut call: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut pause = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        tracing::debug!(attempt, budget = config.max_attempts, "Calling provider");

        let error = match call(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Provider call recovered");
                }
                return RetryResult::Success(value);
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            tracing::debug!(attempt, %error, "Provider call failed for good");
            return RetryResult::PermanentFailure(error);
        }
        if attempt >= config.max_attempts {
            tracing::error!(attempt, %error, "Provider call budget spent");
            return RetryResult::Exhausted {
                attempts: attempt,
                error,
            };
        }

        tracing::warn!(
            attempt,
            %error,
            backoff_ms = pause.as_millis() as u64,
            "Provider call failed, backing off"
        );
        sleep(pause).await;
        pause = pause.saturating_mul(2).min(config.max_delay);
    }
}
