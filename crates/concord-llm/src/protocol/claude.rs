//! Bedrock Claude (Anthropic Messages over `InvokeModel`) wire format types

use serde::{Deserialize, Serialize};

use super::bedrock::BedrockInvocationMetrics;

/// Version string Bedrock requires on Claude bodies
pub const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

// -- Request types --

/// Claude request body as sent to Bedrock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeRequest {
    /// Bedrock API version marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    /// Model identifier; Bedrock takes it from the path, first-party bodies carry it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// System prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<ClaudeSystem>,
    /// Conversation messages
    pub messages: Vec<ClaudeMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Streaming flag, tolerated on inbound bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,
    /// Tool choice configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ClaudeToolChoice>,
}

/// System prompt as a string or a list of text blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeSystem {
    /// Plain string
    Text(String),
    /// Text blocks, concatenated in order
    Blocks(Vec<ClaudeSystemBlock>),
}

impl ClaudeSystem {
    /// Flatten to a single string
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Blocks(blocks) => blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n"),
        }
    }
}

/// Text block within a system prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSystemBlock {
    /// Block type (always "text")
    #[serde(rename = "type")]
    pub block_type: String,
    /// Prompt text
    pub text: String,
}

/// Claude message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    /// Role ("user" or "assistant")
    pub role: String,
    /// Content blocks
    pub content: ClaudeContent,
}

/// Claude content can be a string or array of content blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    /// Plain text (shorthand)
    Text(String),
    /// Array of content blocks
    Blocks(Vec<ClaudeContentBlock>),
}

/// Content block in a Claude message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeContentBlock {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// Image content; the source object is passed through untouched
    Image {
        /// `{"type":"base64",..}` or `{"type":"url",..}`
        source: serde_json::Value,
    },
    /// Tool use request from the assistant
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input as JSON
        input: serde_json::Value,
    },
    /// Tool result from the user
    ToolResult {
        /// Tool use ID this result responds to
        tool_use_id: String,
        /// Result content (string or list of blocks)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<serde_json::Value>,
        /// Whether the tool call errored
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Claude tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,
}

/// Claude tool choice, accepted as a bare mode string or an object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeToolChoice {
    /// `"auto"` or `"any"`
    Mode(String),
    /// `{"type": "auto" | "any" | "tool", "name": ..}`
    Object {
        /// Choice type
        #[serde(rename = "type")]
        choice_type: String,
        /// Tool name when the type is "tool"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

// -- Response types --

/// Claude response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeResponse {
    /// Response identifier
    pub id: String,
    /// Object type (always "message")
    #[serde(rename = "type", default = "message_type")]
    pub response_type: String,
    /// Role (always "assistant")
    #[serde(default = "assistant_role")]
    pub role: String,
    /// Response content blocks
    pub content: Vec<ClaudeResponseBlock>,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Stop sequence that triggered the stop
    #[serde(default)]
    pub stop_sequence: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: ClaudeUsage,
}

fn message_type() -> String {
    "message".to_owned()
}

fn assistant_role() -> String {
    "assistant".to_owned()
}

/// Content block in a Claude response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeResponseBlock {
    /// Text response
    Text {
        /// The text string
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input as JSON
        input: serde_json::Value,
    },
}

/// Claude token usage
///
/// `message_delta` events only report `output_tokens`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClaudeUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Streaming types --

/// Claude stream events, one per Bedrock response-stream chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeStreamEvent {
    /// Stream started
    MessageStart {
        /// Partial message with metadata
        message: ClaudeStreamMessage,
    },
    /// New content block started
    ContentBlockStart {
        /// Block index
        index: u32,
        /// Initial block content
        content_block: ClaudeStreamContentBlock,
    },
    /// Incremental content within a block
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// Delta content
        delta: ClaudeStreamDelta,
    },
    /// Content block finished
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Message metadata delta (stop reason, usage)
    MessageDelta {
        /// Delta with stop reason
        delta: ClaudeMessageDelta,
        /// Updated usage
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<ClaudeUsage>,
    },
    /// Stream completed
    MessageStop {
        /// Metrics Bedrock appends to the final event
        #[serde(
            rename = "amazon-bedrock-invocationMetrics",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        invocation_metrics: Option<BedrockInvocationMetrics>,
    },
    /// Keep-alive
    Ping {},
    /// In-band error
    Error {
        /// Error details
        error: ClaudeErrorDetail,
    },
}

/// Partial message in a `message_start` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeStreamMessage {
    /// Response identifier
    pub id: String,
    /// Object type
    #[serde(rename = "type", default = "message_type")]
    pub message_type: String,
    /// Role
    #[serde(default = "assistant_role")]
    pub role: String,
    /// Content (always empty at start)
    #[serde(default)]
    pub content: Vec<ClaudeResponseBlock>,
    /// Model
    #[serde(default)]
    pub model: String,
    /// Stop reason (always null at start)
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Initial usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ClaudeUsage>,
}

/// Content block in a `content_block_start` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeStreamContentBlock {
    /// Text block
    Text {
        /// Initial text (usually empty)
        text: String,
    },
    /// Tool use block
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
        /// Initial input (usually empty object)
        input: serde_json::Value,
    },
}

/// Delta content in a `content_block_delta` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeStreamDelta {
    /// Incremental text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Incremental tool input JSON
    InputJsonDelta {
        /// JSON fragment
        partial_json: String,
    },
}

/// Delta in a `message_delta` event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeMessageDelta {
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Stop sequence
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

// -- Error response --

/// Claude error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorResponse {
    /// Always "error"
    #[serde(rename = "type")]
    pub response_type: String,
    /// Error details
    pub error: ClaudeErrorDetail,
}

/// Claude error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorDetail {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
}
