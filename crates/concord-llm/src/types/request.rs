use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::tool::{ToolChoice, ToolDefinition};
use crate::error::LlmError;

/// Parameters controlling text generation
///
/// Absent values map to each backend's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Frequency penalty (`OpenAI` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty (`OpenAI` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Random seed (`OpenAI` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// End-user identifier (`OpenAI` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Canonical completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier; empty when the inbound format does not carry one
    pub model: String,
    /// Conversation messages, never empty once validated
    pub messages: Vec<Message>,
    /// Generation parameters
    #[serde(default)]
    pub params: CompletionParams,
    /// Tools available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether the caller asked for a streamed response
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Check request-level invariants
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.messages.is_empty() {
            return Err(LlmError::malformed("messages must contain at least one message"));
        }

        self.messages.iter().try_for_each(Message::validate)
    }

    /// The leading system prompt, if the first message is a system message
    pub fn system_prompt(&self) -> Option<String> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(Message::text_content)
    }

    /// The last user message
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rfind(|m| m.role == Role::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "m".to_owned(),
            messages,
            params: CompletionParams::default(),
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }

    #[test]
    fn empty_messages_are_rejected() {
        let err = request(Vec::new()).validate().unwrap_err();
        assert!(matches!(err, LlmError::MalformedRequest(_)));
    }

    #[test]
    fn system_prompt_only_from_first_message() {
        let req = request(vec![
            Message::text(Role::System, "Be brief."),
            Message::text(Role::User, "Hi"),
        ]);
        assert_eq!(req.system_prompt().as_deref(), Some("Be brief."));

        let req = request(vec![Message::text(Role::User, "Hi")]);
        assert!(req.system_prompt().is_none());
    }

    #[test]
    fn last_user_message_skips_assistant_turns() {
        let req = request(vec![
            Message::text(Role::User, "first"),
            Message::text(Role::Assistant, "reply"),
            Message::text(Role::User, "second"),
            Message::text(Role::Assistant, "trailing"),
        ]);
        assert_eq!(req.last_user_message().map(Message::text_content).as_deref(), Some("second"));
    }
}
