//! Finish-reason mapping between the canonical enum and each wire format
//!
//! | canonical      | `OpenAI`         | Claude          | Titan              |
//! |----------------|------------------|-----------------|--------------------|
//! | Stop           | `stop`           | `end_turn`      | `FINISH`           |
//! | Length         | `length`         | `max_tokens`    | `LENGTH`           |
//! | `ToolCalls`    | `tool_calls`     | `tool_use`      | (none, `FINISH`)   |
//! | `ContentFilter`| `content_filter` | `stop_sequence` | `CONTENT_FILTERED` |

use super::UnsupportedConversion;
use crate::detect::FormatKind;
use crate::types::FinishReason;

pub const fn to_openai(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
    }
}

pub fn from_openai(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        // `function_call` is the legacy spelling
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

pub const fn to_claude(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter => "stop_sequence",
    }
}

pub fn from_claude(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        "stop_sequence" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Titan has no tool-call reason; it is reported as `FINISH`
pub fn to_titan(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "FINISH",
        FinishReason::Length => "LENGTH",
        FinishReason::ToolCalls => {
            UnsupportedConversion::new(FormatKind::BedrockTitan, "finish_reason.tool_calls").record();
            "FINISH"
        }
        FinishReason::ContentFilter => "CONTENT_FILTERED",
    }
}

pub fn from_titan(reason: &str) -> Option<FinishReason> {
    match reason {
        "FINISH" | "STOP_CRITERIA_MET" => Some(FinishReason::Stop),
        "LENGTH" => Some(FinishReason::Length),
        "CONTENT_FILTERED" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}
