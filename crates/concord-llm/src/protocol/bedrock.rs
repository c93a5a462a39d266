//! Envelope types shared by the Bedrock body formats

use serde::{Deserialize, Serialize};

/// Metrics Bedrock appends to the last event of a response stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockInvocationMetrics {
    /// Prompt tokens
    #[serde(default)]
    pub input_token_count: u32,
    /// Generated tokens
    #[serde(default)]
    pub output_token_count: u32,
    /// Total invocation latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_latency: Option<u64>,
    /// Time to first byte in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_byte_latency: Option<u64>,
}

/// Bedrock runtime exception body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockErrorResponse {
    /// Error message
    pub message: String,
    /// Exception name (e.g. `ValidationException`)
    #[serde(rename = "__type", default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
}
