//! Per-provider admission control.

use std::collections::HashMap;
use std::sync::Arc;

use chorus_common::{ChorusError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One bounded gate per provider tag. Tags without a gate are unbounded.
///
/// The limiter is shared by `Arc` handle: every batch dispatched through the
/// same limiter competes for the same slots.
#[derive(Debug, Default)]
pub struct ConcurrencyLimiter {
    gates: HashMap<String, Gate>,
}

#[derive(Debug)]
struct Gate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Holds a slot until dropped.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, provider: impl Into<String>, limit: Option<usize>) -> Result<Self> {
        self.set_limit(provider, limit)?;
        Ok(self)
    }

    /// Bound `provider` to `limit` simultaneous calls, or remove its bound.
    /// A bound of 0 could never admit a call and is rejected.
    pub fn set_limit(&mut self, provider: impl Into<String>, limit: Option<usize>) -> Result<()> {
        let provider = provider.into();
        match limit {
            Some(0) => {
                return Err(ChorusError::Config(format!(
                    "concurrency limit for `{provider}` must be at least 1"
                )));
            }
            Some(capacity) => {
                self.gates.insert(
                    provider,
                    Gate {
                        semaphore: Arc::new(Semaphore::new(capacity)),
                        capacity,
                    },
                );
            }
            None => {
                self.gates.remove(&provider);
            }
        }
        Ok(())
    }

    pub fn capacity(&self, provider: &str) -> Option<usize> {
        self.gates.get(provider).map(|gate| gate.capacity)
    }

    /// Free slots for `provider`, `None` when unbounded.
    pub fn available(&self, provider: &str) -> Option<usize> {
        self.gates
            .get(provider)
            .map(|gate| gate.semaphore.available_permits())
    }

    /// Wait for a slot for `provider`.
    pub async fn acquire(&self, provider: &str) -> Result<LimiterPermit> {
        let Some(gate) = self.gates.get(provider) else {
            return Ok(LimiterPermit { _permit: None });
        };

        let permit = gate
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ChorusError::Task(format!("Semaphore acquire failed: {e}")))?;

        Ok(LimiterPermit {
            _permit: Some(permit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn capacity_and_removal() {
        let mut limiter = ConcurrencyLimiter::new()
            .with_limit("openai", Some(10))
            .and_then(|l| l.with_limit("anthropic", Some(2)))
            .unwrap();
        assert_eq!(limiter.capacity("openai"), Some(10));
        assert_eq!(limiter.capacity("anthropic"), Some(2));
        assert_eq!(limiter.capacity("pplx"), None);

        limiter.set_limit("openai", None).unwrap();
        assert_eq!(limiter.capacity("openai"), None);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let mut limiter = ConcurrencyLimiter::new();
        let err = limiter.set_limit("openai", Some(0)).unwrap_err();
        assert!(matches!(err, ChorusError::Config(ref m) if m.contains("openai")));
        assert_eq!(limiter.capacity("openai"), None);
    }

    #[tokio::test]
    async fn permit_released_on_drop() {
        let limiter = ConcurrencyLimiter::new().with_limit("anthropic", Some(2)).unwrap();

        let first = limiter.acquire("anthropic").await.unwrap();
        let _second = limiter.acquire("anthropic").await.unwrap();
        assert_eq!(limiter.available("anthropic"), Some(0));

        drop(first);
        assert_eq!(limiter.available("anthropic"), Some(1));
    }

    #[tokio::test]
    async fn unbounded_provider_never_waits() {
        let limiter = ConcurrencyLimiter::new();
        let permits: Vec<_> = acquire_many(&limiter, "pplx", 50).await;
        assert_eq!(permits.len(), 50);
        assert_eq!(limiter.available("pplx"), None);
    }

    async fn acquire_many(
        limiter: &ConcurrencyLimiter,
        provider: &str,
        n: usize,
    ) -> Vec<LimiterPermit> {
        let mut permits = Vec::with_capacity(n);
        for _ in 0..n {
            permits.push(limiter.acquire(provider).await.unwrap());
        }
        permits
    }

    #[tokio::test]
    async fn limits_concurrency() {
        let limiter = Arc::new(ConcurrencyLimiter::new().with_limit("anthropic", Some(2)).unwrap());
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..6 {
            let limiter = limiter.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire("anthropic").await.unwrap();
                let current = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.available("anthropic"), Some(2));
    }
}
