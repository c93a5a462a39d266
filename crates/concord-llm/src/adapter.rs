//! Table from wire format to its conversion functions

use serde_json::Value;

use crate::convert::{ChunkStream, NativeStream, claude, openai, titan};
use crate::detect::FormatKind;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Conversion operations for one wire format
#[derive(Debug, Clone, Copy)]
pub struct FormatAdapter {
    /// Format these operations speak
    pub kind: FormatKind,
    /// Parse an inbound body into the canonical request
    pub request_to_canonical: fn(Value) -> Result<CompletionRequest, LlmError>,
    /// Render the canonical request as a backend body
    pub request_from_canonical: fn(&CompletionRequest) -> Value,
    /// Parse a backend response body
    pub response_to_canonical: fn(Value) -> Result<CompletionResponse, LlmError>,
    /// Render the canonical response for a caller
    pub response_from_canonical: fn(CompletionResponse) -> Value,
    /// Turn backend stream events into canonical chunks
    pub decode_stream: fn(NativeStream) -> ChunkStream,
    /// Turn canonical chunks into caller stream events
    pub encode_stream: fn(ChunkStream) -> NativeStream,
    /// Render an error in this format's error shape
    pub error_body: fn(&LlmError) -> Value,
}

static OPENAI: FormatAdapter = FormatAdapter {
    kind: FormatKind::OpenAi,
    request_to_canonical: openai::request_to_canonical,
    request_from_canonical: openai::request_from_canonical,
    response_to_canonical: openai::response_to_canonical,
    response_from_canonical: openai::response_from_canonical,
    decode_stream: openai::decode_stream,
    encode_stream: openai::encode_stream,
    error_body: openai::error_body,
};

static BEDROCK_CLAUDE: FormatAdapter = FormatAdapter {
    kind: FormatKind::BedrockClaude,
    request_to_canonical: claude::request_to_canonical,
    request_from_canonical: claude::request_from_canonical,
    response_to_canonical: claude::response_to_canonical,
    response_from_canonical: claude::response_from_canonical,
    decode_stream: claude::decode_stream,
    encode_stream: claude::encode_stream,
    error_body: claude::error_body,
};

static BEDROCK_TITAN: FormatAdapter = FormatAdapter {
    kind: FormatKind::BedrockTitan,
    request_to_canonical: titan::request_to_canonical,
    request_from_canonical: titan::request_from_canonical,
    response_to_canonical: titan::response_to_canonical,
    response_from_canonical: titan::response_from_canonical,
    decode_stream: titan::decode_stream,
    encode_stream: titan::encode_stream,
    error_body: titan::error_body,
};

/// Adapter for a format; `Unknown` has none
pub const fn adapter_for(kind: FormatKind) -> Option<&'static FormatAdapter> {
    match kind {
        FormatKind::OpenAi => Some(&OPENAI),
        FormatKind::BedrockClaude => Some(&BEDROCK_CLAUDE),
        FormatKind::BedrockTitan => Some(&BEDROCK_TITAN),
        FormatKind::Unknown => None,
    }
}
