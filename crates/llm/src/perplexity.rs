use async_trait::async_trait;
use chorus_common::Result;
use reqwest::header::ACCEPT;

use crate::chat::{self, ChatRequest};
use crate::http::{join_url, require_key};
use crate::provider::Provider;

pub const PERPLEXITY_TAG: &str = "pplx";
pub const PERPLEXITY_KEY_VAR: &str = "PPLX_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "pplx-7b-online";

/// Perplexity's OpenAI-compatible chat endpoint. No default concurrency cap.
pub struct PerplexityAdapter {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl PerplexityAdapter {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for PerplexityAdapter {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        let key = require_key(&self.api_key, PERPLEXITY_TAG, PERPLEXITY_KEY_VAR)?;
        let url = join_url(&self.base_url, "/chat/completions");
        let request = self
            .http_client
            .post(&url)
            .header(ACCEPT, "application/json")
            .bearer_auth(key);

        chat::complete(PERPLEXITY_TAG, request, &ChatRequest::user(model, prompt)).await
    }

    fn name(&self) -> &str {
        PERPLEXITY_TAG
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_common::ChorusError;

    #[test]
    fn unbounded_by_default() {
        let adapter = PerplexityAdapter::new(None, Some("pplx-test".into()));
        assert_eq!(adapter.default_concurrency(), None);
        assert_eq!(adapter.base_url, "https://api.perplexity.ai");
        assert_eq!(adapter.default_model(), Some("pplx-7b-online"));
    }

    #[tokio::test]
    async fn missing_key_names_env_var() {
        let adapter = PerplexityAdapter::new(None, None);
        match adapter.invoke("hi", "pplx-7b-online").await {
            Err(ChorusError::Config(msg)) => assert!(msg.contains("PPLX_API_KEY")),
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
