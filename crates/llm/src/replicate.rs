//! Replicate predictions.
//!
//! A prediction is created with `Prefer: wait`, which usually returns the
//! finished output in the same response. Predictions still running when the
//! server stops waiting are polled at their `urls.get` location.

use std::time::Duration;

use async_trait::async_trait;
use chorus_common::{ChorusError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::http::{join_url, require_key, send_json};
use crate::provider::Provider;

pub const REPLICATE_TAG: &str = "replicate";
pub const REPLICATE_KEY_VAR: &str = "REPLICATE_API_TOKEN";
const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_MODEL: &str = "mistral-7b";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_POLLS: u32 = 240;

/// Short model names and the versioned model they run.
const MODEL_ALIASES: &[(&str, &str)] = &[(
    "mistral-7b",
    "mistralai/mistral-7b-instruct-v0.1:83b6a56e7c828e667f21fd596c338fd4f0039b46bcfa18d973e8e70e455fda70",
)];

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    urls: Option<PredictionUrls>,
}

#[derive(Deserialize)]
struct PredictionUrls {
    get: String,
}

pub struct ReplicateAdapter {
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
    http_client: reqwest::Client,
}

impl ReplicateAdapter {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Version hash for `model`: an alias, or an `owner/name:version` string.
    fn resolve_version(model: &str) -> Result<&str> {
        let versioned = MODEL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == model)
            .map(|(_, versioned)| *versioned)
            .unwrap_or(model);

        match versioned.rsplit_once(':') {
            Some((_, version)) if !version.is_empty() => Ok(version),
            _ => Err(ChorusError::Config(format!(
                "unknown replicate model `{model}`: use a known alias or owner/name:version"
            ))),
        }
    }

    fn extract_output(output: Value) -> Result<String> {
        match output {
            Value::String(text) => Ok(text),
            Value::Array(chunks) => chunks
                .into_iter()
                .map(|chunk| match chunk {
                    Value::String(s) => Ok(s),
                    other => Err(ChorusError::provider(
                        REPLICATE_TAG,
                        format!("unexpected output chunk: {other}"),
                    )),
                })
                .collect(),
            Value::Null => Err(ChorusError::provider(REPLICATE_TAG, "prediction has no output")),
            other => Err(ChorusError::provider(
                REPLICATE_TAG,
                format!("unexpected output shape: {other}"),
            )),
        }
    }
}

#[async_trait]
impl Provider for ReplicateAdapter {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String> {
        let key = require_key(&self.api_key, REPLICATE_TAG, REPLICATE_KEY_VAR)?;
        let version = Self::resolve_version(model)?;
        let body = PredictionRequest {
            version,
            input: PredictionInput { prompt },
        };

        let request = self
            .http_client
            .post(join_url(&self.base_url, "/v1/predictions"))
            .bearer_auth(key)
            .header("Prefer", "wait")
            .json(&body);
        let mut prediction: Prediction = send_json(REPLICATE_TAG, request).await?;

        let mut polls = 0;
        loop {
            let status = prediction.status.clone();
            match status.as_str() {
                "succeeded" => return Self::extract_output(prediction.output),
                "failed" | "canceled" => {
                    return Err(ChorusError::provider(
                        REPLICATE_TAG,
                        format!("prediction {status}: {}", prediction.error),
                    ));
                }
                status => {
                    if polls >= self.max_polls {
                        return Err(ChorusError::provider(
                            REPLICATE_TAG,
                            format!("prediction still {status} after {polls} polls"),
                        ));
                    }
                    let url = prediction
                        .urls
                        .as_ref()
                        .map(|urls| urls.get.clone())
                        .ok_or_else(|| {
                            ChorusError::provider(REPLICATE_TAG, "pending prediction has no poll url")
                        })?;

                    debug!(status, polls, "Polling replicate prediction");
                    tokio::time::sleep(self.poll_interval).await;
                    polls += 1;

                    let request = self.http_client.get(&url).bearer_auth(key);
                    prediction = send_json(REPLICATE_TAG, request).await?;
                }
            }
        }
    }

    fn name(&self) -> &str {
        REPLICATE_TAG
    }

    fn default_concurrency(&self) -> Option<usize> {
        Some(DEFAULT_CONCURRENCY)
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }
}
