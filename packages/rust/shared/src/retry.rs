//! Retry policy for unreliable network-bound calls.
//!
//! A [`RetryPolicy`] is handed to every collaborator that talks to the
//! network. The retry budget belongs to a single call: each attempt runs
//! under its own timeout, and only transient failures are retried.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Result, SeoscopeError};

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Fixed short delays, for tests and local mocks.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            jitter: false,
        }
    }

    /// Total attempts this policy allows per call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_retries as usize);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// Run `call` with a per-attempt `timeout`, retrying transient failures.
    ///
    /// An attempt that exceeds `timeout` fails with
    /// [`SeoscopeError::ProviderTimeout`]. Once the budget is spent the last
    /// error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, timeout: Duration, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempt = || {
            let fut = call();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(SeoscopeError::timeout(operation, timeout)),
                }
            }
        };

        attempt
            .retry(self.backoff())
            .when(|e: &SeoscopeError| e.is_transient())
            .notify(|e: &SeoscopeError, delay: Duration| {
                warn!(
                    operation,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
            })
            .await
    }
}
