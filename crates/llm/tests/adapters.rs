//! Wire-level tests for the HTTP adapters against a local mock server.

use std::time::Duration;

use chorus_common::ChorusError;
use chorus_llm::{AnthropicAdapter, OpenAiAdapter, PerplexityAdapter, Provider, ReplicateAdapter};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn openai_posts_chat_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gpt-3.5-turbo",
            "messages": [{"role": "user", "content": "what is 2+2?"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("4")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(Some(server.uri()), Some("sk-test".into()));
    let text = adapter.invoke("what is 2+2?", "gpt-3.5-turbo").await.unwrap();
    assert_eq!(text, "4");
}

#[tokio::test]
async fn openai_error_status_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(Some(server.uri()), Some("sk-test".into()));
    let err = adapter.invoke("hi", "gpt-4").await.unwrap_err();
    match err {
        ChorusError::Provider { provider, message } => {
            assert_eq!(provider, "openai");
            assert!(message.contains("500"));
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn openai_malformed_body_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(Some(server.uri()), Some("sk-test".into()));
    let err = adapter.invoke("hi", "gpt-4").await.unwrap_err();
    assert!(matches!(err, ChorusError::Provider { .. }));
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    // Nothing listens on the discard port.
    let adapter = OpenAiAdapter::new(Some("http://127.0.0.1:9".into()), Some("sk-test".into()));
    let err = adapter.invoke("hi", "gpt-4").await.unwrap_err();
    assert!(matches!(err, ChorusError::Transport { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn perplexity_posts_chat_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer pplx-test"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("It is Tuesday.")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = PerplexityAdapter::new(Some(server.uri()), Some("pplx-test".into()));
    let text = adapter
        .invoke("what is the current date?", "pplx-70b-online")
        .await
        .unwrap();
    assert_eq!(text, "It is Tuesday.");
}

#[tokio::test]
async fn anthropic_posts_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/complete"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_json(json!({
            "model": "claude-2",
            "prompt": "\n\nHuman: what model are you?\n\nAssistant:",
            "max_tokens_to_sample": 50
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "completion": " I am Claude.",
            "stop_reason": "stop_sequence",
            "model": "claude-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(Some(server.uri()), Some("sk-ant-test".into()));
    let text = adapter.invoke("what model are you?", "claude-2").await.unwrap();
    assert_eq!(text, " I am Claude.");
}

#[tokio::test]
async fn replicate_waits_for_prediction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .and(header("authorization", "Bearer r8-test"))
        .and(header("prefer", "wait"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["2", " + 2", " = 4"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = ReplicateAdapter::new(Some(server.uri()), Some("r8-test".into()));
    let text = adapter.invoke("what is 2+2?", "mistral-7b").await.unwrap();
    assert_eq!(text, "2 + 2 = 4");
}

#[tokio::test]
async fn replicate_polls_pending_prediction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p2",
            "status": "processing",
            "output": null,
            "urls": {"get": format!("{}/v1/predictions/p2", server.uri())}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p2",
            "status": "succeeded",
            "output": "done"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = ReplicateAdapter::new(Some(server.uri()), Some("r8-test".into()))
        .with_polling(Duration::from_millis(5), 3);
    assert_eq!(adapter.invoke("hi", "mistral-7b").await.unwrap(), "done");
}

#[tokio::test]
async fn replicate_failed_prediction_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p3",
            "status": "failed",
            "error": "CUDA out of memory"
        })))
        .mount(&server)
        .await;

    let adapter = ReplicateAdapter::new(Some(server.uri()), Some("r8-test".into()));
    let err = adapter.invoke("hi", "mistral-7b").await.unwrap_err();
    assert!(matches!(err, ChorusError::Provider { ref message, .. } if message.contains("CUDA")));
}
