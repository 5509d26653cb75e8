use std::collections::HashMap;
use std::sync::Arc;

use chorus_common::{ChorusError, ModelRef, Result};

use crate::limiter::ConcurrencyLimiter;
use crate::provider::Provider;
use crate::retry::{RetryPolicy, RetryingProvider};

/// Provider tags mapped to their adapters, each wrapped in its retry policy.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own tag, replacing any previous entry.
    pub fn register<P: Provider + 'static>(&mut self, provider: P, retry: RetryPolicy) {
        let tag = provider.name().to_string();
        self.providers
            .insert(tag, Arc::new(RetryingProvider::new(provider, retry)));
    }

    pub fn with_provider<P: Provider + 'static>(mut self, provider: P, retry: RetryPolicy) -> Self {
        self.register(provider, retry);
        self
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Parse a model reference. A bare registered tag such as `anthropic`
    /// expands to that adapter's default model.
    pub fn model_ref(&self, reference: &str) -> Result<ModelRef> {
        if reference.contains('/') {
            return reference.parse();
        }

        let provider = self
            .providers
            .get(reference)
            .ok_or_else(|| ChorusError::UnknownProvider(reference.to_string()))?;
        let model = provider.default_model().ok_or_else(|| {
            ChorusError::Config(format!(
                "provider `{reference}` has no default model, use `{reference}/<model>`"
            ))
        })?;
        Ok(ModelRef::new(reference, model))
    }

    /// The retrying adapter for `model`'s provider.
    pub fn resolve(&self, model: &ModelRef) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(model.provider())
            .cloned()
            .ok_or_else(|| ChorusError::UnknownProvider(model.provider().to_string()))
    }

    /// A limiter gated at each registered adapter's default ceiling.
    pub fn default_limiter(&self) -> Result<ConcurrencyLimiter> {
        let mut limiter = ConcurrencyLimiter::new();
        for (tag, provider) in &self.providers {
            limiter.set_limit(tag.clone(), provider.default_concurrency())?;
        }
        Ok(limiter)
    }
}
