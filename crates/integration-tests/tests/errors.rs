mod harness;

use concord_llm::FormatKind;
use harness::backend::{MockBackend, MockSet, attach};
use harness::server::{DEFAULT_CONFIG, TestServer, sse_data, sse_event_names};
use serde_json::{Value, json};

const STRICT_CONFIG: &str = r#"
[llm.backends.openai]
format = "openai"
models.include = ["^gpt-"]
"#;

#[tokio::test]
async fn unrecognized_body_is_rejected_in_openai_shape() {
    let mocks = MockSet::new();
    let server = TestServer::start(DEFAULT_CONFIG, mocks.all()).await.unwrap();

    let resp = server.post("/v1/chat/completions", &json!({"prompt": "Hello"})).await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(json["error"]["message"].is_string());

    assert!(mocks.claude.requests().is_empty());
    assert!(mocks.titan.requests().is_empty());
    assert!(mocks.openai.requests().is_empty());
}

#[tokio::test]
async fn invalid_json_is_rejected() {
    let mocks = MockSet::new();
    let server = TestServer::start(DEFAULT_CONFIG, mocks.all()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn malformed_claude_body_is_rejected_in_claude_shape() {
    let mocks = MockSet::new();
    let server = TestServer::start(DEFAULT_CONFIG, mocks.all()).await.unwrap();

    let body = json!({"anthropic_version": "bedrock-2023-05-31", "max_tokens": 10, "messages": []});
    let resp = server.post("/v1/chat/completions", &body).await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(mocks.claude.requests().is_empty());
}

#[tokio::test]
async fn unknown_model_returns_not_found() {
    let openai = MockBackend::new("openai", FormatKind::OpenAi).shared();
    let server = TestServer::start(STRICT_CONFIG, attach(&[&openai])).await.unwrap();

    let body = json!({"model": "mistral.mistral-large", "messages": [{"role": "user", "content": "Hello"}]});
    let resp = server.post("/v1/chat/completions", &body).await;
    assert_eq!(resp.status(), 404);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "not_found_error");
    assert_eq!(json["error"]["code"], "model_not_found");
    assert!(openai.requests().is_empty());
}

#[tokio::test]
async fn titan_body_without_model_or_default_is_rejected() {
    let openai = MockBackend::new("openai", FormatKind::OpenAi).shared();
    let server = TestServer::start(STRICT_CONFIG, attach(&[&openai])).await.unwrap();

    let body = json!({"inputText": "Hi", "textGenerationConfig": {"maxTokenCount": 50}});
    let resp = server.post("/v1/chat/completions", &body).await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["__type"], "ValidationException");
    assert!(openai.requests().is_empty());
}

#[tokio::test]
async fn backend_failure_is_rendered_in_caller_shape() {
    let openai = MockBackend::new("openai", FormatKind::OpenAi)
        .failing(503, "upstream unavailable")
        .shared();
    let server = TestServer::start(STRICT_CONFIG, attach(&[&openai])).await.unwrap();

    let body = json!({
        "anthropic_version": "bedrock-2023-05-31",
        "model": "gpt-4o",
        "max_tokens": 10,
        "messages": [{"role": "user", "content": "Hello"}]
    });
    let resp = server.post("/v1/chat/completions", &body).await;
    assert_eq!(resp.status(), 503);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "api_error");
    assert_eq!(json["error"]["message"], "upstream unavailable");
    assert_eq!(openai.requests().len(), 1);
}

#[tokio::test]
async fn throttled_backend_maps_to_bedrock_exception() {
    let openai = MockBackend::new("openai", FormatKind::OpenAi)
        .failing(429, "rate limited")
        .shared();
    let server = TestServer::start(STRICT_CONFIG, attach(&[&openai])).await.unwrap();

    let body = json!({"inputText": "Hi", "textGenerationConfig": {"maxTokenCount": 50}});
    let resp = server.post("/model/gpt-4o/invoke", &body).await;
    assert_eq!(resp.status(), 429);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["__type"], "ThrottlingException");
    assert_eq!(json["message"], "rate limited");
}

#[tokio::test]
async fn mid_stream_failure_becomes_openai_error_event() {
    let claude = MockBackend::new("claude", FormatKind::BedrockClaude)
        .broken_stream()
        .shared();
    let config = "[llm.backends.claude]\nformat = \"bedrock_claude\"\n";
    let server = TestServer::start(config, attach(&[&claude])).await.unwrap();

    let body = json!({
        "model": "anthropic.claude-3-haiku-20240307-v1:0",
        "stream": true,
        "messages": [{"role": "user", "content": "Hello"}]
    });
    let resp = server.post("/v1/chat/completions", &body).await;
    assert_eq!(resp.status(), 200);

    let text = resp.text().await.unwrap();
    let events: Vec<Value> = sse_data(&text)
        .iter()
        .filter(|d| d.as_str() != "[DONE]")
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();

    let error = events.iter().find(|e| e.get("error").is_some()).unwrap();
    assert_eq!(error["error"]["type"], "streaming_error");

    // no terminal chunk after the failure
    assert!(events.iter().all(|e| e["choices"][0]["finish_reason"].is_null()));
}

#[tokio::test]
async fn mid_stream_failure_becomes_claude_error_event() {
    let openai = MockBackend::new("openai", FormatKind::OpenAi)
        .broken_stream()
        .shared();
    let server = TestServer::start(STRICT_CONFIG, attach(&[&openai])).await.unwrap();

    let body = json!({
        "anthropic_version": "bedrock-2023-05-31",
        "model": "gpt-4o",
        "max_tokens": 10,
        "stream": true,
        "messages": [{"role": "user", "content": "Hello"}]
    });
    let text = server.post("/v1/chat/completions", &body).await.text().await.unwrap();

    let names = sse_event_names(&text);
    assert_eq!(names.last().map(String::as_str), Some("error"));
    assert!(!names.iter().any(|n| n == "message_stop"));

    let last: Value = serde_json::from_str(sse_data(&text).last().unwrap()).unwrap();
    assert_eq!(last["type"], "error");
    assert_eq!(last["error"]["type"], "api_error");
}
