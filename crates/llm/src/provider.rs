use std::sync::Arc;

use async_trait::async_trait;
use chorus_common::Result;

/// A text-generation backend behind the uniform `invoke` contract.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Complete `prompt` with the provider-side `model` and return the text.
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String>;

    /// Provider tag used in model references (`openai` in `openai/gpt-4`).
    fn name(&self) -> &str;

    /// Default ceiling on simultaneous calls; `None` means unbounded.
    fn default_concurrency(&self) -> Option<usize> {
        None
    }

    /// Model used when a reference names only the provider tag.
    fn default_model(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl Provider for Box<dyn Provider> {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        (**self).invoke(prompt, model).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
    fn default_concurrency(&self) -> Option<usize> {
        (**self).default_concurrency()
    }
    fn default_model(&self) -> Option<&str> {
        (**self).default_model()
    }
}

#[async_trait]
impl Provider for Arc<dyn Provider> {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        (**self).invoke(prompt, model).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
    fn default_concurrency(&self) -> Option<usize> {
        (**self).default_concurrency()
    }
    fn default_model(&self) -> Option<&str> {
        (**self).default_model()
    }
}
