//! Integration tests for the Groq client against a mocked chat completions API.

use std::time::Duration;

use medibot_rag::{
    Completion, FailureKind, GenerationClient, GenerationOptions, GroqClient, PromptPayload,
    RagError, TokenUsage,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload() -> PromptPayload {
    PromptPayload {
        instruction: "Answer only from the context.".to_string(),
        body: "Context: Aspirin reduces fever.\nQuestion: What reduces fever?".to_string(),
    }
}

fn client(server: &MockServer) -> GroqClient {
    GroqClient::new("test-key").unwrap().with_base_url(server.uri())
}

async fn generate(server: &MockServer, prompt: &PromptPayload) -> medibot_rag::Result<Completion> {
    client(server).generate(prompt, &GenerationOptions::default()).await
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "llama-3.1-8b-instant",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 42, "completion_tokens": 3, "total_tokens": 45 }
    })
}

#[tokio::test]
async fn returns_completion_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "temperature": 0.5,
            "max_tokens": 512,
            "messages": [
                { "role": "system", "content": "Answer only from the context." },
                {
                    "role": "user",
                    "content": "Context: Aspirin reduces fever.\nQuestion: What reduces fever?"
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Aspirin")))
        .expect(1)
        .mount(&server)
        .await;

    let completion = generate(&server, &payload()).await.unwrap();

    assert_eq!(completion.text, "Aspirin");
    assert_eq!(completion.model, "llama-3.1-8b-instant");
    assert_eq!(
        completion.usage,
        Some(TokenUsage { prompt_tokens: 42, completion_tokens: 3, total_tokens: 45 })
    );
}

#[tokio::test]
async fn empty_instruction_sends_only_the_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [ { "role": "user", "content": "just the body" } ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let prompt = PromptPayload { instruction: String::new(), body: "just the body".to_string() };
    let completion = generate(&server, &prompt).await.unwrap();

    assert_eq!(completion.text, "ok");
}

#[tokio::test]
async fn unauthorized_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid API Key", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let err = generate(&server, &payload()).await.unwrap_err();

    assert!(matches!(
        err,
        RagError::GenerationAuth { ref message, .. } if message.contains("Invalid API Key")
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_error_is_a_backend_error_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = generate(&server, &payload()).await.unwrap_err();

    assert!(matches!(err, RagError::GenerationBackend { status: Some(500), .. }));
    assert_eq!(err.kind(), FailureKind::Generation);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn malformed_body_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = generate(&server, &payload()).await.unwrap_err();

    assert!(matches!(err, RagError::GenerationBackend { .. }));
}

#[tokio::test]
async fn response_without_choices_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = generate(&server, &payload()).await.unwrap_err();

    assert!(matches!(err, RagError::GenerationBackend { .. }));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let options = GenerationOptions::builder().timeout(Duration::from_millis(200)).build().unwrap();

    let err = client(&server).generate(&payload(), &options).await.unwrap_err();

    assert!(matches!(
        err,
        RagError::GenerationTimeout { timeout, .. } if timeout == Duration::from_millis(200)
    ));
}

#[tokio::test]
async fn missing_key_fails_without_a_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = GroqClient::new("   ").unwrap_err();

    assert!(matches!(err, RagError::Configuration(_)));
    assert_eq!(err.kind(), FailureKind::Configuration);
}

#[test]
fn base_url_trailing_slash_is_ignored() {
    let client = GroqClient::new("k").unwrap().with_base_url("http://localhost:9999/v1/");

    assert_eq!(client.endpoint(), "http://localhost:9999/v1/chat/completions");
    assert_eq!(client.provider(), "Groq");
}
