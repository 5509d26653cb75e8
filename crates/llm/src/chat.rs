//! OpenAI-style chat completion framing, shared by every provider that
//! speaks it.

use chorus_common::{ChorusError, Result};
use serde::{Deserialize, Serialize};

use crate::http::send_json;

#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl<'a> ChatRequest<'a> {
    pub(crate) fn user(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

/// Post a single-turn chat request and return `choices[0].message.content`.
pub(crate) async fn complete(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &ChatRequest<'_>,
) -> Result<String> {
    let response: ChatResponse = send_json(provider, request.json(body)).await?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ChorusError::provider(provider, "no choices in response"))
}
