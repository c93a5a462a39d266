//! Conversion between canonical types and Bedrock Claude wire format

use concord_core::HttpError;
use serde_json::{Value, json};

use super::{ChunkDecoder, ChunkEncoder, ChunkStream, NativeStream, UnsupportedConversion, finish, to_json};
use crate::detect::FormatKind;
use crate::error::LlmError;
use crate::protocol::claude::{
    BEDROCK_ANTHROPIC_VERSION, ClaudeContent, ClaudeContentBlock, ClaudeErrorDetail, ClaudeErrorResponse,
    ClaudeMessage, ClaudeMessageDelta, ClaudeRequest, ClaudeResponse, ClaudeResponseBlock, ClaudeStreamContentBlock,
    ClaudeStreamDelta, ClaudeStreamEvent, ClaudeStreamMessage, ClaudeSystem, ClaudeTool, ClaudeToolChoice,
    ClaudeUsage,
};
use crate::types::{
    ChunkDelta, Choice, ChoiceMessage, CompletionChunk, CompletionParams, CompletionRequest, CompletionResponse,
    Content, ContentPart, FinishReason, Message, Role, StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice,
    ToolDefinition, Usage, unix_now,
};

/// Claude requires `max_tokens`; used when the canonical request has none
const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Inbound: Claude wire format -> canonical --

pub fn request_to_canonical(raw: Value) -> Result<CompletionRequest, LlmError> {
    let req: ClaudeRequest =
        serde_json::from_value(raw).map_err(|e| LlmError::malformed(format!("invalid Claude request: {e}")))?;

    if req.top_k.is_some() {
        UnsupportedConversion::new(FormatKind::BedrockClaude, "top_k").record();
    }

    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = req.system {
        messages.push(Message::text(Role::System, system.into_text()));
    }
    for msg in req.messages {
        push_claude_message(msg, &mut messages)?;
    }

    let tools = req.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.name,
                description: tool.description,
                parameters: Some(tool.input_schema),
            })
            .collect()
    });

    let request = CompletionRequest {
        model: req.model.unwrap_or_default(),
        messages,
        params: CompletionParams {
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: Some(req.max_tokens),
            stop_sequences: req.stop_sequences,
            ..CompletionParams::default()
        },
        tools,
        tool_choice: req.tool_choice.map(tool_choice_from_claude).transpose()?,
        stream: req.stream.unwrap_or(false),
    };

    request.validate()?;
    Ok(request)
}

/// Append the canonical messages for one Claude message
///
/// `tool_result` blocks become tool-role messages ahead of whatever else the
/// user sent; `tool_use` blocks become tool calls on the assistant message.
fn push_claude_message(msg: ClaudeMessage, out: &mut Vec<Message>) -> Result<(), LlmError> {
    let role = match msg.role.as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        other => return Err(LlmError::malformed(format!("unknown message role '{other}'"))),
    };

    let blocks = match msg.content {
        ClaudeContent::Text(text) => {
            out.push(Message::text(role, text));
            return Ok(());
        }
        ClaudeContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut emitted_results = false;

    for block in blocks {
        match block {
            ClaudeContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            ClaudeContentBlock::Image { source } => parts.push(ContentPart::Image { source, detail: None }),
            ClaudeContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall::from_input(id, name, &input)),
            ClaudeContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if is_error == Some(true) {
                    UnsupportedConversion::new(FormatKind::BedrockClaude, "tool_result.is_error").record();
                }
                emitted_results = true;
                out.push(Message {
                    role: Role::Tool,
                    content: Some(tool_result_content(content)),
                    name: None,
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id),
                });
            }
        }
    }

    if parts.is_empty() && tool_calls.is_empty() && emitted_results {
        return Ok(());
    }

    out.push(Message {
        role,
        content: (!parts.is_empty() || tool_calls.is_empty()).then_some(Content::Parts(parts)),
        name: None,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    });

    Ok(())
}

fn tool_result_content(content: Option<Value>) -> Content {
    match content {
        Some(Value::String(text)) => Content::Text(text),
        Some(Value::Array(blocks)) => serde_json::from_value::<Vec<ContentPart>>(Value::Array(blocks.clone()))
            .map_or_else(
                |_| Content::Text(super::tool_result_text(Some(&Value::Array(blocks)))),
                Content::Parts,
            ),
        other => Content::Text(super::tool_result_text(other.as_ref())),
    }
}

fn tool_choice_from_claude(choice: ClaudeToolChoice) -> Result<ToolChoice, LlmError> {
    let (kind, name) = match choice {
        ClaudeToolChoice::Mode(mode) => (mode, None),
        ClaudeToolChoice::Object { choice_type, name } => (choice_type, name),
    };

    match kind.as_str() {
        "auto" => Ok(ToolChoice::Auto),
        "any" => Ok(ToolChoice::Required),
        "none" => Ok(ToolChoice::None),
        "tool" => name
            .map(ToolChoice::Named)
            .ok_or_else(|| LlmError::malformed("tool_choice of type 'tool' requires a name")),
        other => Err(LlmError::malformed(format!("unknown tool_choice type '{other}'"))),
    }
}

// -- Outbound: canonical -> Claude wire format --

pub fn request_from_canonical(req: &CompletionRequest) -> Value {
    let mut system_parts = Vec::new();
    let mut messages: Vec<ClaudeMessage> = Vec::new();
    let mut last_was_tool = false;

    for msg in &req.messages {
        match msg.role {
            Role::System => {
                system_parts.push(msg.text_content());
                continue;
            }
            Role::Tool => {
                let block = tool_result_block(msg);
                if last_was_tool
                    && let Some(ClaudeMessage {
                        content: ClaudeContent::Blocks(blocks),
                        ..
                    }) = messages.last_mut()
                {
                    blocks.push(block);
                } else {
                    messages.push(ClaudeMessage {
                        role: "user".to_owned(),
                        content: ClaudeContent::Blocks(vec![block]),
                    });
                }
                last_was_tool = true;
                continue;
            }
            Role::User | Role::Assistant => messages.push(message_to_claude(msg)),
        }
        last_was_tool = false;
    }

    let (tools, tool_choice) = if req.tool_choice == Some(ToolChoice::None) {
        if req.tools.is_some() {
            UnsupportedConversion::new(FormatKind::BedrockClaude, "tool_choice.none").record();
        }
        (None, None)
    } else {
        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| ClaudeTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone().unwrap_or_else(|| json!({"type": "object"})),
                })
                .collect()
        });
        (tools, req.tool_choice.as_ref().map(tool_choice_to_claude))
    };

    super::record_openai_only_params(&req.params, FormatKind::BedrockClaude);

    let body = ClaudeRequest {
        anthropic_version: Some(BEDROCK_ANTHROPIC_VERSION.to_owned()),
        model: None,
        max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system_parts.is_empty()).then(|| ClaudeSystem::Text(system_parts.join("\n\n"))),
        messages,
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        top_k: None,
        stop_sequences: req.params.stop_sequences.clone(),
        stream: None,
        tools,
        tool_choice,
    };

    to_json(&body)
}

fn message_to_claude(msg: &Message) -> ClaudeMessage {
    let role = if msg.role == Role::Assistant { "assistant" } else { "user" };
    let tool_calls = msg.tool_calls.as_deref().unwrap_or_default();

    let content = match &msg.content {
        Some(Content::Text(text)) if tool_calls.is_empty() => ClaudeContent::Text(text.clone()),
        content => {
            let mut blocks = Vec::new();
            match content {
                Some(Content::Text(text)) if !text.is_empty() => {
                    blocks.push(ClaudeContentBlock::Text { text: text.clone() });
                }
                Some(Content::Parts(parts)) => blocks.extend(parts.iter().map(block_from_part)),
                _ => {}
            }
            blocks.extend(tool_calls.iter().map(|tc| ClaudeContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input: tc.input(),
            }));
            ClaudeContent::Blocks(blocks)
        }
    };

    ClaudeMessage {
        role: role.to_owned(),
        content,
    }
}

fn block_from_part(part: &ContentPart) -> ClaudeContentBlock {
    match part {
        ContentPart::Text { text } => ClaudeContentBlock::Text { text: text.clone() },
        ContentPart::Image { source, .. } => ClaudeContentBlock::Image { source: source.clone() },
        ContentPart::ToolUse { id, name, input } => ClaudeContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ClaudeContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}

fn tool_result_block(msg: &Message) -> ClaudeContentBlock {
    let content = match &msg.content {
        Some(Content::Text(text)) => Value::String(text.clone()),
        Some(Content::Parts(parts)) => to_json(parts),
        None => Value::String(String::new()),
    };

    ClaudeContentBlock::ToolResult {
        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
        content: Some(content),
        is_error: None,
    }
}

fn tool_choice_to_claude(choice: &ToolChoice) -> ClaudeToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto | ToolChoice::None => ("auto", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Named(name) => ("tool", Some(name.clone())),
    };

    ClaudeToolChoice::Object {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Responses --

pub fn response_to_canonical(raw: Value) -> Result<CompletionResponse, LlmError> {
    let resp: ClaudeResponse =
        serde_json::from_value(raw).map_err(|e| LlmError::backend(format!("invalid Claude response: {e}")))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in resp.content {
        match block {
            ClaudeResponseBlock::Text { text: t } => text.push_str(&t),
            ClaudeResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall::from_input(id, name, &input)),
        }
    }

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(text)
    };

    Ok(CompletionResponse {
        id: resp.id,
        model: resp.model,
        created: unix_now(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage::assistant(content, tool_calls),
            finish_reason: resp.stop_reason.as_deref().and_then(finish::from_claude),
        }],
        usage: Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
    })
}

pub fn response_from_canonical(resp: CompletionResponse) -> Value {
    if resp.choices.len() > 1 {
        UnsupportedConversion::new(FormatKind::BedrockClaude, "choices").record();
    }

    let mut content = Vec::new();
    let mut stop_reason = None;
    if let Some(choice) = resp.choices.into_iter().next() {
        if let Some(text) = choice.message.content
            && !text.is_empty()
        {
            content.push(ClaudeResponseBlock::Text { text });
        }
        for tc in choice.message.tool_calls.iter().flatten() {
            content.push(ClaudeResponseBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input: tc.input(),
            });
        }
        stop_reason = choice.finish_reason.map(|r| finish::to_claude(r).to_owned());
    }

    let body = ClaudeResponse {
        id: resp.id,
        response_type: "message".to_owned(),
        role: "assistant".to_owned(),
        content,
        model: resp.model,
        stop_reason,
        stop_sequence: None,
        usage: ClaudeUsage {
            input_tokens: resp.usage.prompt_tokens,
            output_tokens: resp.usage.completion_tokens,
        },
    };

    to_json(&body)
}

// -- Streams --

/// Decoder state for Claude event streams
///
/// The stop reason from `message_delta` is held until `message_stop`, which
/// produces the terminal chunk.
#[derive(Debug, Default)]
struct ClaudeDecoder {
    id: String,
    model: String,
    created: u64,
    stop_reason: Option<FinishReason>,
    usage: Usage,
    /// Claude numbers content blocks across text and tool use; tool calls get their own sequence
    next_tool_call_index: u32,
    current_tool_call_index: Option<u32>,
    finished: bool,
}

impl ClaudeDecoder {
    fn chunk(&self) -> CompletionChunk {
        CompletionChunk::new(self.id.clone(), self.model.clone(), self.created)
    }

    fn terminal(&mut self) -> CompletionChunk {
        self.finished = true;
        if self.id.is_empty() {
            self.id = super::response_id();
            self.created = unix_now();
        }

        self.chunk()
            .with_usage(Some(self.usage))
            .finished([(0, self.stop_reason.unwrap_or(FinishReason::Stop))])
    }
}

impl ChunkDecoder for ClaudeDecoder {
    fn decode(&mut self, event: Value) -> Result<Vec<CompletionChunk>, LlmError> {
        let event: ClaudeStreamEvent = serde_json::from_value(event)
            .map_err(|e| LlmError::Streaming(format!("invalid Claude stream event: {e}")))?;

        let chunk = match event {
            ClaudeStreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.created = unix_now();
                if let Some(usage) = message.usage {
                    self.usage = Usage::new(usage.input_tokens, usage.output_tokens);
                }
                self.chunk().with_delta(0, ChunkDelta::role(Role::Assistant))
            }

            ClaudeStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                ClaudeStreamContentBlock::Text { text } if !text.is_empty() => {
                    self.chunk().with_delta(0, ChunkDelta::text(text))
                }
                ClaudeStreamContentBlock::Text { .. } => self.chunk(),
                ClaudeStreamContentBlock::ToolUse { id, name, .. } => {
                    let index = self.next_tool_call_index;
                    self.next_tool_call_index += 1;
                    self.current_tool_call_index = Some(index);
                    self.chunk().with_delta(
                        0,
                        ChunkDelta::tool_call(StreamToolCall {
                            index,
                            id: Some(id),
                            function: Some(StreamFunctionCall {
                                name: Some(name),
                                arguments: None,
                            }),
                        }),
                    )
                }
            },

            ClaudeStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ClaudeStreamDelta::TextDelta { text } => self.chunk().with_delta(0, ChunkDelta::text(text)),
                ClaudeStreamDelta::InputJsonDelta { partial_json } => {
                    let index = self
                        .current_tool_call_index
                        .unwrap_or_else(|| self.next_tool_call_index.saturating_sub(1));
                    self.chunk().with_delta(
                        0,
                        ChunkDelta::tool_call(StreamToolCall {
                            index,
                            id: None,
                            function: Some(StreamFunctionCall {
                                name: None,
                                arguments: Some(partial_json),
                            }),
                        }),
                    )
                }
            },

            ClaudeStreamEvent::ContentBlockStop { .. } => {
                self.current_tool_call_index = None;
                self.chunk()
            }

            ClaudeStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(finish::from_claude(&reason).unwrap_or(FinishReason::Stop));
                }
                if let Some(usage) = usage {
                    let prompt = if usage.input_tokens > 0 {
                        usage.input_tokens
                    } else {
                        self.usage.prompt_tokens
                    };
                    self.usage = Usage::new(prompt, usage.output_tokens);
                }
                self.chunk().with_usage(Some(self.usage))
            }

            ClaudeStreamEvent::MessageStop { invocation_metrics } => {
                if let Some(metrics) = invocation_metrics
                    && self.usage == Usage::default()
                {
                    self.usage = Usage::new(metrics.input_token_count, metrics.output_token_count);
                }
                return Ok(vec![self.terminal()]);
            }

            ClaudeStreamEvent::Ping {} => self.chunk(),

            ClaudeStreamEvent::Error { error } => {
                return Err(LlmError::Streaming(format!("{}: {}", error.error_type, error.message)));
            }
        };

        Ok(vec![chunk])
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) -> CompletionChunk {
        self.terminal()
    }
}

pub fn decode_stream(native: NativeStream) -> ChunkStream {
    super::decode_with(native, ClaudeDecoder::default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text { index: u32 },
    ToolUse { index: u32, call: u32 },
}

impl OpenBlock {
    const fn index(self) -> u32 {
        match self {
            Self::Text { index } | Self::ToolUse { index, .. } => index,
        }
    }
}

/// Encoder producing the Claude event sequence from canonical chunks
///
/// `message_start` precedes the first block; text and tool calls each get
/// their own content block; the terminal chunk closes the open block and
/// emits `message_delta` followed by `message_stop`.
#[derive(Debug, Default)]
struct ClaudeEncoder {
    started: bool,
    finished: bool,
    open_block: Option<OpenBlock>,
    next_block_index: u32,
    usage: Usage,
    dropped_choices: bool,
}

impl ClaudeEncoder {
    fn close_block(&mut self, events: &mut Vec<ClaudeStreamEvent>) {
        if let Some(block) = self.open_block.take() {
            events.push(ClaudeStreamEvent::ContentBlockStop { index: block.index() });
        }
    }

    fn next_index(&mut self) -> u32 {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }

    fn text_block(&mut self, events: &mut Vec<ClaudeStreamEvent>) -> u32 {
        if let Some(OpenBlock::Text { index }) = self.open_block {
            return index;
        }

        self.close_block(events);
        let index = self.next_index();
        self.open_block = Some(OpenBlock::Text { index });
        events.push(ClaudeStreamEvent::ContentBlockStart {
            index,
            content_block: ClaudeStreamContentBlock::Text { text: String::new() },
        });
        index
    }

    fn tool_call(&mut self, call: StreamToolCall, events: &mut Vec<ClaudeStreamEvent>) {
        let function = call.function.unwrap_or(StreamFunctionCall {
            name: None,
            arguments: None,
        });

        let continues_open = matches!(
            self.open_block,
            Some(OpenBlock::ToolUse { call: open, .. }) if open == call.index
        );

        let index = match self.open_block {
            Some(block) if continues_open && call.id.is_none() => block.index(),
            _ => {
                self.close_block(events);
                let index = self.next_index();
                self.open_block = Some(OpenBlock::ToolUse {
                    index,
                    call: call.index,
                });
                events.push(ClaudeStreamEvent::ContentBlockStart {
                    index,
                    content_block: ClaudeStreamContentBlock::ToolUse {
                        id: call.id.unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple())),
                        name: function.name.unwrap_or_default(),
                        input: json!({}),
                    },
                });
                index
            }
        };

        if let Some(partial_json) = function.arguments
            && !partial_json.is_empty()
        {
            events.push(ClaudeStreamEvent::ContentBlockDelta {
                index,
                delta: ClaudeStreamDelta::InputJsonDelta { partial_json },
            });
        }
    }
}

impl ChunkEncoder for ClaudeEncoder {
    fn encode(&mut self, chunk: CompletionChunk) -> Vec<Value> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(usage) = chunk.usage {
            self.usage = usage;
        }

        if !self.started {
            self.started = true;
            events.push(ClaudeStreamEvent::MessageStart {
                message: ClaudeStreamMessage {
                    id: chunk.id.clone(),
                    message_type: "message".to_owned(),
                    role: "assistant".to_owned(),
                    content: Vec::new(),
                    model: chunk.model.clone(),
                    stop_reason: None,
                    usage: Some(ClaudeUsage {
                        input_tokens: self.usage.prompt_tokens,
                        output_tokens: 0,
                    }),
                },
            });
        }

        if chunk.is_terminal() {
            self.close_block(&mut events);
            let reason = chunk
                .choices
                .first()
                .and_then(|c| c.finish_reason)
                .unwrap_or(FinishReason::Stop);
            events.push(ClaudeStreamEvent::MessageDelta {
                delta: ClaudeMessageDelta {
                    stop_reason: Some(finish::to_claude(reason).to_owned()),
                    stop_sequence: None,
                },
                usage: Some(ClaudeUsage {
                    input_tokens: self.usage.prompt_tokens,
                    output_tokens: self.usage.completion_tokens,
                }),
            });
            events.push(ClaudeStreamEvent::MessageStop {
                invocation_metrics: None,
            });
            self.finished = true;
        } else {
            for choice in chunk.choices {
                if choice.index != 0 {
                    if !self.dropped_choices {
                        UnsupportedConversion::new(FormatKind::BedrockClaude, "choices").record();
                        self.dropped_choices = true;
                    }
                    continue;
                }

                if let Some(text) = choice.delta.content
                    && !text.is_empty()
                {
                    let index = self.text_block(&mut events);
                    events.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: ClaudeStreamDelta::TextDelta { text },
                    });
                }

                for call in choice.delta.tool_calls.into_iter().flatten() {
                    self.tool_call(call, &mut events);
                }
            }
        }

        events.iter().map(to_json).collect()
    }
}

pub fn encode_stream(chunks: ChunkStream) -> NativeStream {
    super::encode_with(chunks, ClaudeEncoder::default())
}

// -- Errors --

pub fn error_body(error: &LlmError) -> Value {
    let error_type = match error {
        LlmError::Streaming(_) | LlmError::Internal(_) => "api_error",
        other => other.error_type(),
    };

    let body = ClaudeErrorResponse {
        response_type: "error".to_owned(),
        error: ClaudeErrorDetail {
            error_type: error_type.to_owned(),
            message: error.client_message(),
        },
    };

    to_json(&body)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::convert::openai;
    use crate::convert::test_support::{chunks, collect_chunks, collect_events, native};

    fn brief_request() -> Value {
        json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 256,
            "system": "Be brief.",
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello."},
                {"role": "user", "content": "How are you?"}
            ]
        })
    }

    #[test]
    fn system_prompt_becomes_first_message() {
        let req = request_to_canonical(json!({
            "max_tokens": 100,
            "system": "Be brief.",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[0].text_content(), "Be brief.");

        let body = openai::request_from_canonical(&req);
        assert_eq!(
            body["messages"],
            json!([{"role": "system", "content": "Be brief."}, {"role": "user", "content": "Hi"}])
        );
    }

    #[test]
    fn round_trip_preserves_system_and_order() {
        let original = brief_request();
        let back = request_from_canonical(&request_to_canonical(original.clone()).unwrap());

        assert_eq!(back["system"], original["system"]);
        assert_eq!(back["messages"], original["messages"]);
        assert_eq!(back["max_tokens"], 256);
        assert_eq!(back["anthropic_version"], BEDROCK_ANTHROPIC_VERSION);
    }

    #[test]
    fn empty_system_survives_round_trip() {
        let original = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 16,
            "system": "",
            "messages": [{"role": "user", "content": "Hi"}]
        });

        let req = request_to_canonical(original.clone()).unwrap();
        assert_eq!(req.system_prompt().as_deref(), Some(""));

        let back = request_from_canonical(&req);
        assert_eq!(back["system"], "");
        assert_eq!(back["messages"], original["messages"]);
    }

    #[test]
    fn system_blocks_are_joined() {
        let req = request_to_canonical(json!({
            "max_tokens": 10,
            "system": [{"type": "text", "text": "One."}, {"type": "text", "text": "Two."}],
            "messages": [{"role": "user", "content": "x"}]
        }))
        .unwrap();
        assert_eq!(req.system_prompt().as_deref(), Some("One.\nTwo."));
    }

    #[test]
    fn missing_max_tokens_is_malformed() {
        let raw = json!({"messages": [{"role": "user", "content": "Hi"}]});
        assert!(matches!(request_to_canonical(raw), Err(LlmError::MalformedRequest(_))));
    }

    #[test]
    fn image_source_is_kept_verbatim() {
        let source = json!({"type": "base64", "media_type": "image/png", "data": "iVBOR"});
        let req = request_to_canonical(json!({
            "max_tokens": 10,
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "What is this?"},
                {"type": "image", "source": source}
            ]}]
        }))
        .unwrap();

        let Some(Content::Parts(parts)) = &req.messages[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts[1], ContentPart::Image { source, detail: None });
    }

    #[test]
    fn tool_use_and_result_map_to_calls_and_tool_messages() {
        let req = request_to_canonical(json!({
            "max_tokens": 10,
            "messages": [
                {"role": "user", "content": "Weather?"},
                {"role": "assistant", "content": [
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Oslo"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "rainy"}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(req.messages.len(), 3);
        let calls = req.messages[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "weather");
        assert_eq!(calls[0].input(), json!({"city": "Oslo"}));
        assert_eq!(req.messages[2].role, Role::Tool);
        assert_eq!(req.messages[2].tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(req.messages[2].text_content(), "rainy");

        let back = request_from_canonical(&req);
        assert_eq!(back["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(back["messages"][2]["role"], "user");
        assert_eq!(back["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(back["messages"][2]["content"][0]["content"], "rainy");
    }

    #[test]
    fn tool_choice_forms() {
        let parse = |choice: Value| {
            request_to_canonical(json!({
                "max_tokens": 10,
                "messages": [{"role": "user", "content": "x"}],
                "tool_choice": choice
            }))
        };

        assert_eq!(parse(json!("auto")).unwrap().tool_choice, Some(ToolChoice::Auto));
        assert_eq!(parse(json!({"type": "any"})).unwrap().tool_choice, Some(ToolChoice::Required));
        assert_eq!(
            parse(json!({"type": "tool", "name": "calc"})).unwrap().tool_choice,
            Some(ToolChoice::Named("calc".to_owned()))
        );
        assert!(matches!(parse(json!({"type": "tool"})), Err(LlmError::MalformedRequest(_))));
    }

    #[test]
    fn top_k_is_dropped() {
        let req = request_to_canonical(json!({
            "max_tokens": 10,
            "top_k": 40,
            "messages": [{"role": "user", "content": "x"}]
        }))
        .unwrap();
        assert!(request_from_canonical(&req).get("top_k").is_none());
    }

    #[test]
    fn claude_tools_survive_openai_round_trip() {
        let tools = json!([{
            "name": "get_weather",
            "description": "Look up weather",
            "input_schema": {"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]}
        }]);
        let claude = request_to_canonical(json!({
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "x"}],
            "tools": tools,
            "tool_choice": {"type": "tool", "name": "get_weather"}
        }))
        .unwrap();

        let openai_body = openai::request_from_canonical(&claude);
        assert_eq!(openai_body["tools"][0]["type"], "function");
        assert_eq!(openai_body["tools"][0]["function"]["parameters"], tools[0]["input_schema"]);

        let back = request_from_canonical(&openai::request_to_canonical(openai_body).unwrap());
        assert_eq!(back["tools"], tools);
        assert_eq!(back["tool_choice"], json!({"type": "tool", "name": "get_weather"}));
    }

    fn canonical(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            messages,
            params: CompletionParams::default(),
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }

    #[test]
    fn later_system_messages_are_appended() {
        let req = canonical(vec![
            Message::text(Role::System, "First."),
            Message::text(Role::User, "Hi"),
            Message::text(Role::System, "Second."),
        ]);
        let body = request_from_canonical(&req);
        assert_eq!(body["system"], "First.\n\nSecond.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn consecutive_tool_messages_merge() {
        let tool = |id: &str, text: &str| Message {
            role: Role::Tool,
            content: Some(Content::Text(text.to_owned())),
            name: None,
            tool_calls: None,
            tool_call_id: Some(id.to_owned()),
        };
        let req = canonical(vec![
            Message::text(Role::User, "go"),
            Message {
                role: Role::Assistant,
                content: None,
                name: None,
                tool_calls: Some(vec![
                    ToolCall::from_input("a".to_owned(), "f".to_owned(), &json!({})),
                    ToolCall::from_input("b".to_owned(), "f".to_owned(), &json!({})),
                ]),
                tool_call_id: None,
            },
            tool("a", "1"),
            tool("b", "2"),
        ]);

        let body = request_from_canonical(&req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "b");
    }

    #[test]
    fn tool_choice_mapping_outbound() {
        let mut req = canonical(vec![Message::text(Role::User, "x")]);
        req.tools = Some(vec![ToolDefinition {
            name: "f".to_owned(),
            description: None,
            parameters: None,
        }]);

        req.tool_choice = Some(ToolChoice::Required);
        let body = request_from_canonical(&req);
        assert_eq!(body["tool_choice"], json!({"type": "any"}));
        assert_eq!(body["tools"][0]["input_schema"], json!({"type": "object"}));

        req.tool_choice = Some(ToolChoice::None);
        let body = request_from_canonical(&req);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn response_converts_both_ways() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-haiku",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Oslo"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        });

        let resp = response_to_canonical(raw).unwrap();
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(resp.usage.total_tokens, 14);

        let openai_body = openai::response_from_canonical(resp.clone());
        assert_eq!(openai_body["choices"][0]["finish_reason"], "tool_calls");

        let back = response_from_canonical(resp);
        assert_eq!(back["stop_reason"], "tool_use");
        assert_eq!(back["content"][1]["input"], json!({"city": "Oslo"}));
        assert_eq!(back["usage"], json!({"input_tokens": 10, "output_tokens": 4}));
    }

    fn native_events() -> Vec<Value> {
        vec![
            json!({"type": "message_start", "message": {"id": "msg_1", "type": "message", "role": "assistant",
                "content": [], "model": "claude-3-haiku", "usage": {"input_tokens": 12, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " there"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "max_tokens"}, "usage": {"output_tokens": 7}}),
            json!({"type": "message_stop", "amazon-bedrock-invocationMetrics": {"inputTokenCount": 12, "outputTokenCount": 7}}),
        ]
    }

    #[tokio::test]
    async fn each_event_yields_one_chunk_and_stop_is_terminal() {
        let out = collect_chunks(decode_stream(native(native_events()))).await;

        assert_eq!(out.len(), 7);
        assert_eq!(out[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(out[2].content(), Some("Hi"));
        assert_eq!(out[3].content(), Some(" there"));
        assert!(out[..6].iter().all(|c| !c.is_terminal()));

        let last = &out[6];
        assert!(last.is_terminal());
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Length));
        assert_eq!(last.usage, Some(Usage::new(12, 7)));
        assert_eq!(last.id, "msg_1");
    }

    #[tokio::test]
    async fn tool_use_blocks_get_sequential_call_indexes() {
        let events = vec![
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "f", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"a\":"}}),
        ];
        let out = collect_chunks(decode_stream(native(events))).await;

        let start = out[2].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(start[0].index, 0);
        assert_eq!(start[0].id.as_deref(), Some("toolu_1"));
        let delta = out[3].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(delta[0].index, 0);

        // stream ended without message_stop
        assert!(out[4].is_terminal());
    }

    #[tokio::test]
    async fn error_event_fails_stream() {
        let events = vec![json!({"type": "error", "error": {"type": "overloaded_error", "message": "busy"}})];
        let mut stream = decode_stream(native(events));
        let first = futures_util::StreamExt::next(&mut stream).await;
        assert!(matches!(first, Some(Err(LlmError::Streaming(msg))) if msg.contains("busy")));
    }

    #[tokio::test]
    async fn encoder_emits_claude_event_sequence() {
        let input = vec![
            CompletionChunk::new("id", "m", 1).with_delta(0, ChunkDelta::role(Role::Assistant)),
            CompletionChunk::new("id", "m", 1).with_delta(0, ChunkDelta::text("Hi")),
            CompletionChunk::new("id", "m", 1).with_delta(
                0,
                ChunkDelta::tool_call(StreamToolCall {
                    index: 0,
                    id: Some("call_1".to_owned()),
                    function: Some(StreamFunctionCall {
                        name: Some("f".to_owned()),
                        arguments: Some("{}".to_owned()),
                    }),
                }),
            ),
            CompletionChunk::new("id", "m", 1)
                .with_usage(Some(Usage::new(3, 4)))
                .finished([(0, FinishReason::ToolCalls)]),
        ];

        let out = collect_events(encode_stream(chunks(input))).await;
        let types: Vec<&str> = out.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(out[4]["content_block"]["name"], "f");
        assert_eq!(out[4]["index"], 1);
        assert_eq!(out[7]["delta"]["stop_reason"], "tool_use");
        assert_eq!(out[7]["usage"]["output_tokens"], 4);
    }

    #[test]
    fn error_body_has_claude_shape() {
        let body = error_body(&LlmError::malformed("bad"));
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(error_body(&LlmError::Streaming("x".to_owned()))["error"]["type"], "api_error");
    }
}
