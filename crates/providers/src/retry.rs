//! Retrying provider — bounded retry of transient failures.
//!
//! Each attempt runs under its own timeout. Retryable errors (rate limits,
//! timeouts, network failures, 5xx) are retried after a fixed wait until
//! the total retry period is used up; everything else fails immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::error::ProviderError;
use tandem_core::provider::*;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry settings for one agent's model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Timeout of a single attempt
    pub request_timeout: Duration,

    /// Pause between attempts
    pub retry_wait: Duration,

    /// Total time after the first failure during which retries may start
    pub max_retry_period: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            retry_wait: Duration::from_secs(10),
            max_retry_period: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn from_secs(request_timeout: u64, retry_wait: u64, max_retry_period: u64) -> Self {
        Self {
            request_timeout: Duration::from_secs(request_timeout),
            retry_wait: Duration::from_secs(retry_wait),
            max_retry_period: Duration::from_secs(max_retry_period),
        }
    }
}

/// A provider that retries another provider's transient failures.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut first_failure: Option<Instant> = None;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let call = self.inner.complete(request.clone());
            let outcome = match tokio::time::timeout(self.policy.request_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.inner.name(),
                    self.policy.request_timeout.as_secs()
                ))),
            };

            let error = match outcome {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(provider = %self.inner.name(), attempt, "Provider recovered");
                    }
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            let started = *first_failure.get_or_insert_with(Instant::now);
            let wait = match &error {
                ProviderError::RateLimited { retry_after_secs } => {
                    self.policy.retry_wait.max(Duration::from_secs(*retry_after_secs))
                }
                _ => self.policy.retry_wait,
            };

            if started.elapsed() + wait > self.policy.max_retry_period {
                warn!(
                    provider = %self.inner.name(),
                    attempts = attempt,
                    error = %error,
                    "Retry period exhausted"
                );
                return Err(error);
            }

            warn!(
                provider = %self.inner.name(),
                attempt,
                wait_secs = wait.as_secs(),
                error = %error,
                "Retrying after error"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
