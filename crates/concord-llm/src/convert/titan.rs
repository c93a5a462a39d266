//! Conversion between canonical types and Bedrock Titan wire format
//!
//! Titan is a single-prompt completion format: only the last user turn
//! survives the trip to Titan, and everything conversational is logged as
//! dropped.

use concord_core::HttpError;
use serde_json::Value;

use super::{ChunkDecoder, ChunkEncoder, ChunkStream, NativeStream, UnsupportedConversion, finish, to_json};
use crate::detect::FormatKind;
use crate::error::LlmError;
use crate::protocol::bedrock::BedrockErrorResponse;
use crate::protocol::titan::{TitanGenerationConfig, TitanRequest, TitanResponse, TitanResult, TitanStreamChunk};
use crate::types::{
    ChunkDelta, Choice, ChoiceMessage, CompletionChunk, CompletionParams, CompletionRequest, CompletionResponse,
    Content, FinishReason, Message, Role, Usage, unix_now,
};

// -- Inbound: Titan wire format -> canonical --

pub fn request_to_canonical(raw: Value) -> Result<CompletionRequest, LlmError> {
    let req: TitanRequest =
        serde_json::from_value(raw).map_err(|e| LlmError::malformed(format!("invalid Titan request: {e}")))?;

    let config = req.text_generation_config.unwrap_or_default();

    let request = CompletionRequest {
        model: String::new(),
        messages: vec![Message::text(Role::User, req.input_text)],
        params: CompletionParams {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_token_count,
            stop_sequences: config.stop_sequences,
            ..CompletionParams::default()
        },
        tools: None,
        tool_choice: None,
        stream: false,
    };

    request.validate()?;
    Ok(request)
}

// -- Outbound: canonical -> Titan wire format --

pub fn request_from_canonical(req: &CompletionRequest) -> Value {
    let last_user = req.last_user_message();

    if req.messages.len() > 1 {
        UnsupportedConversion::new(FormatKind::BedrockTitan, "messages.history").record();
    }
    if req.tools.is_some() {
        UnsupportedConversion::new(FormatKind::BedrockTitan, "tools").record();
    }
    if req.tool_choice.is_some() {
        UnsupportedConversion::new(FormatKind::BedrockTitan, "tool_choice").record();
    }
    if last_user.is_some_and(|m| m.content.as_ref().is_some_and(Content::has_images)) {
        UnsupportedConversion::new(FormatKind::BedrockTitan, "image").record();
    }
    super::record_openai_only_params(&req.params, FormatKind::BedrockTitan);

    let body = TitanRequest {
        input_text: last_user.map(Message::text_content).unwrap_or_default(),
        text_generation_config: Some(TitanGenerationConfig {
            max_token_count: req.params.max_tokens,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            stop_sequences: req.params.stop_sequences.clone(),
        }),
    };

    to_json(&body)
}

// -- Responses --

pub fn response_to_canonical(raw: Value) -> Result<CompletionResponse, LlmError> {
    let resp: TitanResponse =
        serde_json::from_value(raw).map_err(|e| LlmError::backend(format!("invalid Titan response: {e}")))?;

    let result = resp
        .results
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::backend("Titan response contained no results"))?;

    Ok(CompletionResponse {
        id: super::response_id(),
        model: String::new(),
        created: unix_now(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage::assistant(Some(result.output_text), Vec::new()),
            finish_reason: result.completion_reason.as_deref().and_then(finish::from_titan),
        }],
        usage: Usage::new(resp.input_text_token_count, result.token_count),
    })
}

pub fn response_from_canonical(resp: CompletionResponse) -> Value {
    let choice = resp.choices.into_iter().next();

    if choice.as_ref().is_some_and(|c| c.message.tool_calls.is_some()) {
        UnsupportedConversion::new(FormatKind::BedrockTitan, "tool_calls").record();
    }

    let body = TitanResponse {
        input_text_token_count: resp.usage.prompt_tokens,
        results: vec![TitanResult {
            token_count: resp.usage.completion_tokens,
            output_text: choice
                .as_ref()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default(),
            completion_reason: choice
                .and_then(|c| c.finish_reason)
                .map(|r| finish::to_titan(r).to_owned()),
        }],
    };

    to_json(&body)
}

// -- Streams --

/// Decoder state for Titan chunk streams
///
/// Titan has no end sentinel: the chunk carrying `completionReason` yields
/// its content chunk followed by a synthesized terminal chunk.
#[derive(Debug)]
struct TitanDecoder {
    id: String,
    created: u64,
    usage: Usage,
    sent_role: bool,
    finished: bool,
}

impl Default for TitanDecoder {
    fn default() -> Self {
        Self {
            id: super::response_id(),
            created: unix_now(),
            usage: Usage::default(),
            sent_role: false,
            finished: false,
        }
    }
}

impl TitanDecoder {
    fn chunk(&self) -> CompletionChunk {
        CompletionChunk::new(self.id.clone(), String::new(), self.created)
    }

    fn terminal(&mut self, reason: FinishReason) -> CompletionChunk {
        self.finished = true;
        self.chunk().with_usage(Some(self.usage)).finished([(0, reason)])
    }
}

impl ChunkDecoder for TitanDecoder {
    fn decode(&mut self, event: Value) -> Result<Vec<CompletionChunk>, LlmError> {
        let chunk: TitanStreamChunk = serde_json::from_value(event)
            .map_err(|e| LlmError::Streaming(format!("invalid Titan stream chunk: {e}")))?;

        let prompt = chunk.input_text_token_count.unwrap_or(self.usage.prompt_tokens);
        let completion = chunk
            .total_output_text_token_count
            .unwrap_or(self.usage.completion_tokens);
        self.usage = Usage::new(prompt, completion);
        if let Some(metrics) = &chunk.invocation_metrics {
            self.usage = Usage::new(metrics.input_token_count, metrics.output_token_count);
        }

        let mut delta = ChunkDelta::text(chunk.output_text);
        if !self.sent_role {
            self.sent_role = true;
            delta.role = Some(Role::Assistant);
        }
        let content = self.chunk().with_delta(0, delta);

        match chunk.completion_reason {
            Some(reason) => {
                let reason = finish::from_titan(&reason).unwrap_or(FinishReason::Stop);
                Ok(vec![content, self.terminal(reason)])
            }
            None => Ok(vec![content]),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) -> CompletionChunk {
        self.terminal(FinishReason::Stop)
    }
}

pub fn decode_stream(native: NativeStream) -> ChunkStream {
    super::decode_with(native, TitanDecoder::default())
}

/// Encoder producing Titan stream chunks
#[derive(Debug, Default)]
struct TitanEncoder {
    usage: Option<Usage>,
    sent_prompt_count: bool,
    dropped_tool_calls: bool,
    finished: bool,
}

impl TitanEncoder {
    fn event(&mut self, output_text: String, completion_reason: Option<String>) -> Value {
        let input_text_token_count = if self.sent_prompt_count {
            None
        } else {
            self.sent_prompt_count = self.usage.is_some();
            self.usage.map(|u| u.prompt_tokens)
        };

        to_json(&TitanStreamChunk {
            output_text,
            index: 0,
            total_output_text_token_count: self.usage.map(|u| u.completion_tokens),
            completion_reason,
            input_text_token_count,
            invocation_metrics: None,
        })
    }
}

impl ChunkEncoder for TitanEncoder {
    fn encode(&mut self, chunk: CompletionChunk) -> Vec<Value> {
        if self.finished {
            return Vec::new();
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        if chunk.is_terminal() {
            self.finished = true;
            let reason = chunk
                .choices
                .first()
                .and_then(|c| c.finish_reason)
                .unwrap_or(FinishReason::Stop);
            return vec![self.event(String::new(), Some(finish::to_titan(reason).to_owned()))];
        }

        let mut events = Vec::new();
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if choice.delta.tool_calls.is_some() && !self.dropped_tool_calls {
                UnsupportedConversion::new(FormatKind::BedrockTitan, "tool_calls").record();
                self.dropped_tool_calls = true;
            }
            if let Some(text) = choice.delta.content
                && !text.is_empty()
            {
                events.push(self.event(text, None));
            }
        }
        events
    }
}

pub fn encode_stream(chunks: ChunkStream) -> NativeStream {
    super::encode_with(chunks, TitanEncoder::default())
}

// -- Errors --

/// Bedrock exception name for an error
fn exception_type(error: &LlmError) -> &'static str {
    match error {
        LlmError::MalformedRequest(_) => "ValidationException",
        LlmError::ModelNotFound { .. } | LlmError::BackendNotFound { .. } => "ResourceNotFoundException",
        LlmError::Backend { status: Some(429), .. } => "ThrottlingException",
        LlmError::Backend { .. } => "ModelErrorException",
        LlmError::Streaming(_) => "ModelStreamErrorException",
        LlmError::Internal(_) => "InternalServerException",
    }
}

pub fn error_body(error: &LlmError) -> Value {
    to_json(&BedrockErrorResponse {
        message: error.client_message(),
        exception_type: Some(exception_type(error).to_owned()),
    })
}
