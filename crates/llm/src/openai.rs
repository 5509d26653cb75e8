use async_trait::async_trait;
use chorus_common::Result;

use crate::chat::{self, ChatRequest};
use crate::http::{join_url, require_key};
use crate::provider::Provider;

pub const OPENAI_TAG: &str = "openai";
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

pub struct OpenAiAdapter {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiAdapter {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        let key = require_key(&self.api_key, OPENAI_TAG, OPENAI_KEY_VAR)?;
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let request = self.http_client.post(&url).bearer_auth(key);

        chat::complete(OPENAI_TAG, request, &ChatRequest::user(model, prompt)).await
    }

    fn name(&self) -> &str {
        OPENAI_TAG
    }

    fn default_concurrency(&self) -> Option<usize> {
        Some(DEFAULT_CONCURRENCY)
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
    fn default_base_url_is_public_api() {
        let adapter = OpenAiAdapter::new(None, None);
        assert_eq!(adapter.base_url, "https://api.openai.com");
        assert_eq!(adapter.default_concurrency(), Some(10));
    }

    #[tokio::test]
    async fn missing_key_is_config_error() {
        let adapter = OpenAiAdapter::new(Some("http://127.0.0.1:9".into()), None);
        let err = adapter.invoke("hi", "gpt-3.5-turbo").await.unwrap_err();
        assert!(matches!(err, ChorusError::Config(_)));
    }
}
