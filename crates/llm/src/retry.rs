use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chorus_common::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::provider::Provider;

/// How many times a call is attempted and how long to wait in between.
///
/// The delay after failed attempt `n` (1-based) is
/// `initial_delay_ms * backoff_multiplier^(n-1)`, capped at `max_delay_ms`.
/// The default makes 3 attempts with no delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self::attempts(1)
    }

    /// `max_attempts` attempts with no delay.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial_delay_ms: u64, multiplier: f64, max_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.backoff_multiplier = multiplier;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    /// The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        call = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying provider call"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Applies a [`RetryPolicy`] to every call of the wrapped provider.
pub struct RetryingProvider<T: Provider> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Provider> RetryingProvider<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Provider> Provider for RetryingProvider<T> {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        let label = format!("{}/{}", self.inner.name(), model);
        self.policy
            .run(&label, |_| self.inner.invoke(prompt, model))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_concurrency(&self) -> Option<usize> {
        self.inner.default_concurrency()
    }

    fn default_model(&self) -> Option<&str> {
        self.inner.default_model()
    }
}
