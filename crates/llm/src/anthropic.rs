use async_trait::async_trait;
use chorus_common::Result;
use serde::{Deserialize, Serialize};

use crate::http::{join_url, require_key, send_json};
use crate::provider::Provider;

pub const ANTHROPIC_TAG: &str = "anthropic";
pub const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const HUMAN_PROMPT: &str = "\n\nHuman:";
const AI_PROMPT: &str = "\n\nAssistant:";
const DEFAULT_MAX_TOKENS: u32 = 50;
const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_MODEL: &str = "claude-2";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens_to_sample: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    completion: String,
}

/// Anthropic's text completions endpoint, which frames the prompt as a
/// single Human/Assistant turn.
pub struct AnthropicAdapter {
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            max_tokens: DEFAULT_MAX_TOKENS,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request_body<'a>(&self, prompt: &str, model: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model,
            prompt: format!("{HUMAN_PROMPT} {prompt}{AI_PROMPT}"),
            max_tokens_to_sample: self.max_tokens,
        }
    }
}

#[async_trait]
impl Provider for AnthropicAdapter {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        let key = require_key(&self.api_key, ANTHROPIC_TAG, ANTHROPIC_KEY_VAR)?;
        let body = self.build_request_body(prompt, model);

        let request = self
            .http_client
            .post(join_url(&self.base_url, "/v1/complete"))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: CompletionResponse = send_json(ANTHROPIC_TAG, request).await?;
        Ok(response.completion)
    }

    fn name(&self) -> &str {
        ANTHROPIC_TAG
    }

    fn default_concurrency(&self) -> Option<usize> {
        Some(DEFAULT_CONCURRENCY)
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }
}
