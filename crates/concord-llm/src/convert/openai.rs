//! Conversion between canonical types and `OpenAI` wire format

use concord_core::HttpError;
use serde_json::{Value, json};

use super::{ChunkDecoder, ChunkEncoder, ChunkStream, NativeStream, UnsupportedConversion, finish, to_json};
use crate::detect::FormatKind;
use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiErrorDetail, OpenAiErrorResponse,
    OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiRequest, OpenAiResponse,
    OpenAiStop, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamFunctionCall,
    OpenAiStreamOptions, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage, STREAM_DONE,
};
use crate::types::{
    ChunkDelta, Choice, ChoiceMessage, CompletionChunk, CompletionParams, CompletionRequest, CompletionResponse,
    Content, ContentPart, FinishReason, FunctionCall, Message, Role, StreamFunctionCall, StreamToolCall, ToolCall,
    ToolChoice, ToolDefinition, Usage, unix_now,
};

// -- Inbound: OpenAI wire format -> canonical --

pub fn request_to_canonical(raw: Value) -> Result<CompletionRequest, LlmError> {
    let req: OpenAiRequest =
        serde_json::from_value(raw).map_err(|e| LlmError::malformed(format!("invalid OpenAI request: {e}")))?;

    for field in unmodeled_fields(&req) {
        UnsupportedConversion::unmodeled(FormatKind::OpenAi, field).record();
    }

    let messages = req
        .messages
        .into_iter()
        .map(message_from_openai)
        .collect::<Result<Vec<_>, _>>()?;

    let tools = req.tools.map(|tools| {
        tools
            .into_iter()
            .filter_map(|tool| {
                if tool.tool_type != "function" {
                    UnsupportedConversion::new(FormatKind::OpenAi, "tools.type").record();
                    return None;
                }
                Some(ToolDefinition {
                    name: tool.function.name,
                    description: tool.function.description,
                    parameters: tool.function.parameters,
                })
            })
            .collect()
    });

    let request = CompletionRequest {
        model: req.model.unwrap_or_default(),
        messages,
        params: CompletionParams {
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens.or(req.max_completion_tokens),
            stop_sequences: req.stop.map(OpenAiStop::into_vec),
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            seed: req.seed,
            user: req.user,
        },
        tools,
        tool_choice: req.tool_choice.map(tool_choice_from_openai).transpose()?,
        stream: req.stream.unwrap_or(false),
    };

    request.validate()?;
    Ok(request)
}

/// Request fields that have no canonical equivalent and are dropped
fn unmodeled_fields(req: &OpenAiRequest) -> Vec<&str> {
    req.logit_bias
        .as_ref()
        .map(|_| "logit_bias")
        .into_iter()
        .chain(req.extra.keys().map(String::as_str))
        .collect()
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "system" | "developer" => Some(Role::System),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

fn message_from_openai(msg: OpenAiMessage) -> Result<Message, LlmError> {
    let role = parse_role(&msg.role).ok_or_else(|| LlmError::malformed(format!("unknown message role '{}'", msg.role)))?;

    let content = msg.content.map(|content| match content {
        OpenAiContent::Text(text) => Content::Text(text),
        OpenAiContent::Parts(parts) => Content::Parts(
            parts
                .into_iter()
                .map(|part| match part {
                    OpenAiContentPart::Text { text } => ContentPart::Text { text },
                    OpenAiContentPart::ImageUrl { image_url } => ContentPart::Image {
                        source: image_source_from_url(&image_url.url),
                        detail: image_url.detail,
                    },
                })
                .collect(),
        ),
    });

    let tool_calls = msg.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                function: FunctionCall {
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                },
            })
            .collect()
    });

    Ok(Message {
        role,
        content,
        name: msg.name,
        tool_calls,
        tool_call_id: msg.tool_call_id,
    })
}

fn tool_choice_from_openai(value: Value) -> Result<ToolChoice, LlmError> {
    match value {
        Value::String(mode) => match mode.as_str() {
            "auto" => Ok(ToolChoice::Auto),
            "none" => Ok(ToolChoice::None),
            "required" => Ok(ToolChoice::Required),
            other => Err(LlmError::malformed(format!("unknown tool_choice '{other}'"))),
        },
        Value::Object(obj) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map(|name| ToolChoice::Named(name.to_owned()))
            .ok_or_else(|| LlmError::malformed("tool_choice object must name a function")),
        _ => Err(LlmError::malformed("tool_choice must be a string or an object")),
    }
}

/// Turn an image URL into a provider source object
///
/// `data:` URLs become base64 sources, anything else a URL source.
fn image_source_from_url(url: &str) -> Value {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((mime_and_encoding, data)) = rest.split_once(',')
        && let Some(media_type) = mime_and_encoding.strip_suffix(";base64")
    {
        return json!({"type": "base64", "media_type": media_type, "data": data});
    }
    json!({"type": "url", "url": url})
}

/// Inverse of [`image_source_from_url`]
fn image_url_from_source(source: &Value) -> Option<String> {
    match source.get("type").and_then(Value::as_str)? {
        "base64" => {
            let media_type = source.get("media_type").and_then(Value::as_str).unwrap_or("image/png");
            let data = source.get("data").and_then(Value::as_str)?;
            Some(format!("data:{media_type};base64,{data}"))
        }
        "url" => source.get("url").and_then(Value::as_str).map(ToOwned::to_owned),
        _ => None,
    }
}

// -- Outbound: canonical -> OpenAI wire format --

pub fn request_from_canonical(req: &CompletionRequest) -> Value {
    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| OpenAiTool {
                tool_type: "function".to_owned(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    });

    let tool_choice = req.tool_choice.as_ref().map(|choice| match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Named(name) => json!({"type": "function", "function": {"name": name}}),
    });

    let body = OpenAiRequest {
        model: (!req.model.is_empty()).then(|| req.model.clone()),
        messages: messages_to_openai(&req.messages),
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        max_tokens: req.params.max_tokens,
        max_completion_tokens: None,
        stop: req.params.stop_sequences.clone().map(OpenAiStop::Many),
        frequency_penalty: req.params.frequency_penalty,
        presence_penalty: req.params.presence_penalty,
        seed: req.params.seed,
        user: req.params.user.clone(),
        logit_bias: None,
        stream: req.stream.then_some(true),
        tools,
        tool_choice,
        stream_options: req.stream.then_some(OpenAiStreamOptions { include_usage: true }),
        extra: serde_json::Map::new(),
    };

    to_json(&body)
}

fn messages_to_openai(messages: &[Message]) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        let mut parts = Vec::new();
        let mut tool_calls: Vec<OpenAiToolCall> = msg.tool_calls.iter().flatten().map(tool_call_to_openai).collect();
        let mut split_results = false;

        match &msg.content {
            None => {}
            Some(Content::Text(text)) => parts.push(OpenAiContentPart::Text { text: text.clone() }),
            Some(Content::Parts(blocks)) => {
                for block in blocks {
                    match block {
                        ContentPart::Text { text } => parts.push(OpenAiContentPart::Text { text: text.clone() }),
                        ContentPart::Image { source, detail } => match image_url_from_source(source) {
                            Some(url) => parts.push(OpenAiContentPart::ImageUrl {
                                image_url: OpenAiImageUrl {
                                    url,
                                    detail: detail.clone(),
                                },
                            }),
                            None => UnsupportedConversion::new(FormatKind::OpenAi, "image.source").record(),
                        },
                        ContentPart::ToolUse { id, name, input } => tool_calls.push(OpenAiToolCall {
                            id: id.clone(),
                            tool_type: "function".to_owned(),
                            function: OpenAiFunctionCall {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        }),
                        ContentPart::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            if *is_error == Some(true) {
                                UnsupportedConversion::new(FormatKind::OpenAi, "tool_result.is_error").record();
                            }
                            split_results = true;
                            out.push(OpenAiMessage {
                                role: Role::Tool.to_string(),
                                content: Some(OpenAiContent::Text(super::tool_result_text(content.as_ref()))),
                                name: None,
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                    }
                }
            }
        }

        let content = collapse_parts(parts);
        if split_results && content.is_none() && tool_calls.is_empty() {
            continue;
        }

        out.push(OpenAiMessage {
            role: msg.role.to_string(),
            content,
            name: msg.name.clone(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: msg.tool_call_id.clone(),
        });
    }

    out
}

/// Plain string when every part is text, parts otherwise
fn collapse_parts(parts: Vec<OpenAiContentPart>) -> Option<OpenAiContent> {
    if parts.is_empty() {
        return None;
    }

    if parts.iter().all(|p| matches!(p, OpenAiContentPart::Text { .. })) {
        let text = parts
            .into_iter()
            .filter_map(|p| match p {
                OpenAiContentPart::Text { text } => Some(text),
                OpenAiContentPart::ImageUrl { .. } => None,
            })
            .collect::<String>();
        return Some(OpenAiContent::Text(text));
    }

    Some(OpenAiContent::Parts(parts))
}

fn tool_call_to_openai(call: &ToolCall) -> OpenAiToolCall {
    OpenAiToolCall {
        id: call.id.clone(),
        tool_type: "function".to_owned(),
        function: OpenAiFunctionCall {
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        },
    }
}

// -- Responses --

pub fn response_to_canonical(raw: Value) -> Result<CompletionResponse, LlmError> {
    let resp: OpenAiResponse =
        serde_json::from_value(raw).map_err(|e| LlmError::backend(format!("invalid OpenAI response: {e}")))?;

    let choices = resp
        .choices
        .into_iter()
        .map(|choice| {
            let tool_calls = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    function: FunctionCall {
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    },
                })
                .collect();

            Choice {
                index: choice.index,
                message: ChoiceMessage::assistant(choice.message.content, tool_calls),
                finish_reason: choice.finish_reason.as_deref().and_then(finish::from_openai),
            }
        })
        .collect();

    Ok(CompletionResponse {
        id: resp.id,
        model: resp.model,
        created: if resp.created == 0 { unix_now() } else { resp.created },
        choices,
        usage: resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default(),
    })
}

pub fn response_from_canonical(resp: CompletionResponse) -> Value {
    let body = OpenAiResponse {
        id: resp.id,
        object: "chat.completion".to_owned(),
        created: resp.created,
        model: resp.model,
        choices: resp
            .choices
            .into_iter()
            .map(|choice| OpenAiChoice {
                index: choice.index,
                message: OpenAiChoiceMessage {
                    role: choice.message.role.to_string(),
                    content: choice.message.content,
                    tool_calls: choice
                        .message
                        .tool_calls
                        .map(|calls| calls.iter().map(tool_call_to_openai).collect()),
                },
                finish_reason: choice.finish_reason.map(|r| finish::to_openai(r).to_owned()),
            })
            .collect(),
        usage: Some(usage_to_openai(resp.usage)),
    };

    to_json(&body)
}

const fn usage_to_openai(usage: Usage) -> OpenAiUsage {
    OpenAiUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

// -- Streams --

/// Decoder state for `OpenAI` chunk streams
///
/// Finish reasons are remembered per choice and moved onto the terminal
/// chunk produced by the `[DONE]` sentinel.
#[derive(Debug, Default)]
struct OpenAiDecoder {
    id: String,
    model: String,
    created: u64,
    reasons: Vec<(u32, FinishReason)>,
    usage: Option<Usage>,
    finished: bool,
}

impl OpenAiDecoder {
    fn terminal(&mut self) -> CompletionChunk {
        self.finished = true;

        let reasons = if self.reasons.is_empty() {
            vec![(0, FinishReason::Stop)]
        } else {
            self.reasons.clone()
        };
        let id = if self.id.is_empty() {
            super::response_id()
        } else {
            self.id.clone()
        };
        let created = if self.created == 0 { unix_now() } else { self.created };

        CompletionChunk::new(id, self.model.clone(), created)
            .with_usage(self.usage)
            .finished(reasons)
    }

    fn remember_reason(&mut self, index: u32, reason: FinishReason) {
        match self.reasons.iter_mut().find(|(i, _)| *i == index) {
            Some(entry) => entry.1 = reason,
            None => self.reasons.push((index, reason)),
        }
    }
}

impl ChunkDecoder for OpenAiDecoder {
    fn decode(&mut self, event: Value) -> Result<Vec<CompletionChunk>, LlmError> {
        if event.as_str() == Some(STREAM_DONE) {
            return Ok(vec![self.terminal()]);
        }

        let chunk: OpenAiStreamChunk = serde_json::from_value(event)
            .map_err(|e| LlmError::Streaming(format!("invalid OpenAI stream chunk: {e}")))?;

        if self.id.is_empty() {
            self.id.clone_from(&chunk.id);
            self.model.clone_from(&chunk.model);
            self.created = chunk.created;
        }

        let usage = chunk.usage.map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));
        if usage.is_some() {
            self.usage = usage;
        }

        let mut out = CompletionChunk::new(chunk.id, chunk.model, chunk.created).with_usage(usage);
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.remember_reason(choice.index, finish::from_openai(reason).unwrap_or(FinishReason::Stop));
            }
            out = out.with_delta(choice.index, delta_from_openai(choice.delta));
        }

        Ok(vec![out])
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) -> CompletionChunk {
        self.terminal()
    }
}

fn delta_from_openai(delta: OpenAiStreamDelta) -> ChunkDelta {
    ChunkDelta {
        role: delta.role.as_deref().and_then(parse_role),
        content: delta.content,
        tool_calls: delta.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| StreamToolCall {
                    index: tc.index,
                    id: tc.id,
                    function: tc.function.map(|f| StreamFunctionCall {
                        name: f.name,
                        arguments: f.arguments,
                    }),
                })
                .collect()
        }),
    }
}

pub fn decode_stream(native: NativeStream) -> ChunkStream {
    super::decode_with(native, OpenAiDecoder::default())
}

/// Encoder for `OpenAI` chunk streams
///
/// Chunks with neither choices nor usage carry nothing for an `OpenAI` caller
/// and are skipped. The `[DONE]` sentinel is left to the transport.
struct OpenAiEncoder;

impl ChunkEncoder for OpenAiEncoder {
    fn encode(&mut self, chunk: CompletionChunk) -> Vec<Value> {
        if chunk.choices.is_empty() && chunk.usage.is_none() {
            return Vec::new();
        }
        vec![to_json(&chunk_to_openai(chunk))]
    }
}

fn chunk_to_openai(chunk: CompletionChunk) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: chunk.id,
        object: "chat.completion.chunk".to_owned(),
        created: chunk.created,
        model: chunk.model,
        choices: chunk
            .choices
            .into_iter()
            .map(|choice| OpenAiStreamChoice {
                index: choice.index,
                delta: OpenAiStreamDelta {
                    role: choice.delta.role.map(|r| r.to_string()),
                    content: choice.delta.content,
                    tool_calls: choice.delta.tool_calls.map(|calls| {
                        calls
                            .into_iter()
                            .map(|tc| OpenAiStreamToolCall {
                                index: tc.index,
                                tool_type: tc.id.as_ref().map(|_| "function".to_owned()),
                                id: tc.id,
                                function: tc.function.map(|f| OpenAiStreamFunctionCall {
                                    name: f.name,
                                    arguments: f.arguments,
                                }),
                            })
                            .collect()
                    }),
                },
                finish_reason: choice.finish_reason.map(|r| finish::to_openai(r).to_owned()),
            })
            .collect(),
        usage: chunk.usage.map(usage_to_openai),
    }
}

pub fn encode_stream(chunks: ChunkStream) -> NativeStream {
    super::encode_with(chunks, OpenAiEncoder)
}

// -- Errors --

pub fn error_body(error: &LlmError) -> Value {
    let body = OpenAiErrorResponse {
        error: OpenAiErrorDetail {
            message: error.client_message(),
            error_type: error.error_type().to_owned(),
            param: None,
            code: match error {
                LlmError::ModelNotFound { .. } => Some("model_not_found".to_owned()),
                _ => Some(error.status_code().as_u16().to_string()),
            },
        },
    };

    to_json(&body)
}
