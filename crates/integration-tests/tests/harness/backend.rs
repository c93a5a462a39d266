//! In-process mock backends for integration tests
//!
//! Each mock speaks one native format and answers every request with the
//! same canned reply, recording the bodies it was sent.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use concord_llm::{Backend, BackendRequest, FormatKind, LlmError, NativeStream};
use serde_json::{Value, json};

/// Text every mock replies with
pub const REPLY: &str = "Hello from mock backend";

/// How a mock stream should end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Native termination signal
    Clean,
    /// Fail after the first content event
    Error,
}

/// Mock backend answering in its native format
pub struct MockBackend {
    name: String,
    format: FormatKind,
    failure: Option<(u16, String)>,
    stream_end: StreamEnd,
    requests: Mutex<Vec<BackendRequest>>,
}

impl MockBackend {
    pub fn new(name: &str, format: FormatKind) -> Self {
        Self {
            name: name.to_owned(),
            format,
            failure: None,
            stream_end: StreamEnd::Clean,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request with the given upstream status
    pub fn failing(mut self, status: u16, message: &str) -> Self {
        self.failure = Some((status, message.to_owned()));
        self
    }

    /// Break streams after the first content event
    pub fn broken_stream(mut self) -> Self {
        self.stream_end = StreamEnd::Error;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, request: BackendRequest) -> Result<(), LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        match &self.failure {
            Some((status, message)) => Err(LlmError::Backend {
                status: Some(*status),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn response(&self, model: &str) -> Value {
        match self.format {
            FormatKind::OpenAi => json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": model,
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": REPLY},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 4, "total_tokens": 9}
            }),
            FormatKind::BedrockClaude => json!({
                "id": "msg_mock",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": REPLY}],
                "model": model,
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 5, "output_tokens": 4}
            }),
            FormatKind::BedrockTitan | FormatKind::Unknown => json!({
                "inputTextTokenCount": 5,
                "results": [{"tokenCount": 4, "outputText": REPLY, "completionReason": "FINISH"}]
            }),
        }
    }

    /// Native events carrying `REPLY` split in two
    fn events(&self, model: &str) -> Vec<Value> {
        let (head, tail) = REPLY.split_at(5);

        match self.format {
            FormatKind::OpenAi => {
                let chunk = |delta: Value, finish: Value| {
                    json!({
                        "id": "chatcmpl-mock",
                        "object": "chat.completion.chunk",
                        "created": 1_700_000_000,
                        "model": model,
                        "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
                    })
                };
                vec![
                    chunk(json!({"role": "assistant", "content": head}), Value::Null),
                    chunk(json!({"content": tail}), Value::Null),
                    chunk(json!({}), json!("stop")),
                    json!("[DONE]"),
                ]
            }
            FormatKind::BedrockClaude => vec![
                json!({"type": "message_start", "message": {"id": "msg_mock", "type": "message", "role": "assistant",
                    "content": [], "model": model, "usage": {"input_tokens": 5, "output_tokens": 1}}}),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": head}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": tail}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 4}}),
                json!({"type": "message_stop"}),
            ],
            FormatKind::BedrockTitan | FormatKind::Unknown => vec![
                json!({"outputText": head, "index": 0, "totalOutputTextTokenCount": 1, "completionReason": null,
                    "inputTextTokenCount": 5}),
                json!({"outputText": tail, "index": 0, "totalOutputTextTokenCount": 4, "completionReason": "FINISH"}),
            ],
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> FormatKind {
        self.format
    }

    async fn invoke(&self, request: BackendRequest) -> Result<Value, LlmError> {
        let model = request.model.clone();
        self.record(request)?;
        Ok(self.response(&model))
    }

    async fn invoke_stream(&self, request: BackendRequest) -> Result<NativeStream, LlmError> {
        let model = request.model.clone();
        self.record(request)?;

        let mut events: Vec<Result<Value, LlmError>> = self.events(&model).into_iter().map(Ok).collect();
        if self.stream_end == StreamEnd::Error {
            // keep the role/start event and one content event
            let keep = if self.format == FormatKind::BedrockClaude { 3 } else { 1 };
            events.truncate(keep);
            events.push(Err(LlmError::Streaming("connection reset by backend".to_owned())));
        }

        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}

/// Erase mock types for [`super::server::TestServer::start`]
pub fn attach(mocks: &[&Arc<MockBackend>]) -> Vec<Arc<dyn Backend>> {
    mocks.iter().map(|mock| Arc::clone(mock) as Arc<dyn Backend>).collect()
}

/// One mock per format, named as in the default test config
pub struct MockSet {
    pub claude: Arc<MockBackend>,
    pub titan: Arc<MockBackend>,
    pub openai: Arc<MockBackend>,
}

impl MockSet {
    pub fn new() -> Self {
        Self {
            claude: MockBackend::new("claude", FormatKind::BedrockClaude).shared(),
            titan: MockBackend::new("titan", FormatKind::BedrockTitan).shared(),
            openai: MockBackend::new("openai", FormatKind::OpenAi).shared(),
        }
    }

    pub fn all(&self) -> Vec<Arc<dyn Backend>> {
        attach(&[&self.claude, &self.titan, &self.openai])
    }
}
