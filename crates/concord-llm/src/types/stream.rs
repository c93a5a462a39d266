use serde::{Deserialize, Serialize};

use super::message::Role;
use super::response::{FinishReason, Usage};

/// One element of a canonical response stream
///
/// Every decoded stream ends with exactly one terminal chunk: each choice
/// carries a finish reason and an empty delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Response identifier shared by all chunks of a stream
    pub id: String,
    /// Model producing the stream
    pub model: String,
    /// Unix timestamp of stream creation
    pub created: u64,
    /// Per-choice deltas
    pub choices: Vec<ChunkChoice>,
    /// Usage reported alongside this chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// Chunk with no choices
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
            choices: Vec::new(),
            usage: None,
        }
    }

    /// Append a delta for choice `index`
    #[must_use]
    pub fn with_delta(mut self, index: u32, delta: ChunkDelta) -> Self {
        self.choices.push(ChunkChoice {
            index,
            delta,
            finish_reason: None,
        });
        self
    }

    /// Attach usage
    #[must_use]
    pub const fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    /// Turn into a terminal chunk finishing each listed choice
    #[must_use]
    pub fn finished(mut self, reasons: impl IntoIterator<Item = (u32, FinishReason)>) -> Self {
        self.choices = reasons
            .into_iter()
            .map(|(index, reason)| ChunkChoice {
                index,
                delta: ChunkDelta::default(),
                finish_reason: Some(reason),
            })
            .collect();
        self
    }

    /// Whether this is the stream's terminal chunk
    pub fn is_terminal(&self) -> bool {
        !self.choices.is_empty()
            && self
                .choices
                .iter()
                .all(|c| c.finish_reason.is_some() && c.delta.is_empty())
    }

    /// Text carried by the first choice
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

/// Delta for one choice within a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Partial message fields
    pub delta: ChunkDelta,
    /// Finish reason, set only on the terminal chunk
    pub finish_reason: Option<FinishReason>,
}

/// Partial message fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role (first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Incremental text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental tool call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamToolCall>>,
}

impl ChunkDelta {
    /// Delta carrying only the assistant role
    pub const fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            content: None,
            tool_calls: None,
        }
    }

    /// Delta carrying only text
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: None,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Delta carrying a single tool call fragment
    pub fn tool_call(call: StreamToolCall) -> Self {
        Self {
            role: None,
            content: None,
            tool_calls: Some(vec![call]),
        }
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.as_deref().is_none_or(str::is_empty)
            && self.tool_calls.as_ref().is_none_or(Vec::is_empty)
    }
}

/// Partial tool call data within a delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamToolCall {
    /// Index of this tool call among the message's tool calls
    pub index: u32,
    /// Tool call ID (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

/// Partial function call data within a streaming tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
