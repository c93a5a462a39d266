//! Bedrock Titan text generation wire format types

use serde::{Deserialize, Serialize};

use super::bedrock::BedrockInvocationMetrics;

/// Titan text generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanRequest {
    /// Prompt text
    pub input_text: String,
    /// Generation parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_generation_config: Option<TitanGenerationConfig>,
}

/// Titan `textGenerationConfig`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanGenerationConfig {
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_token_count: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Titan response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanResponse {
    /// Prompt tokens
    #[serde(default)]
    pub input_text_token_count: u32,
    /// Generated results; Titan returns exactly one
    pub results: Vec<TitanResult>,
}

/// One Titan generation result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanResult {
    /// Generated tokens
    #[serde(default)]
    pub token_count: u32,
    /// Generated text
    pub output_text: String,
    /// Why generation stopped
    #[serde(default)]
    pub completion_reason: Option<String>,
}

/// One Titan response-stream chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanStreamChunk {
    /// Generated text fragment
    #[serde(default)]
    pub output_text: String,
    /// Result index
    #[serde(default)]
    pub index: u32,
    /// Running count of generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_output_text_token_count: Option<u32>,
    /// Set on the last chunk only
    #[serde(default)]
    pub completion_reason: Option<String>,
    /// Prompt tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text_token_count: Option<u32>,
    /// Metrics Bedrock appends to the final chunk
    #[serde(
        rename = "amazon-bedrock-invocationMetrics",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub invocation_metrics: Option<BedrockInvocationMetrics>,
}
