use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;

/// Translation core configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Model used when an inbound body carries none (Bedrock bodies never do)
    #[serde(default)]
    pub default_model: Option<String>,
    /// Log per-format detection confidence scores at debug level
    #[serde(default)]
    pub log_confidence: bool,
    /// Backend configurations keyed by name, in resolution order
    #[serde(default)]
    pub backends: IndexMap<String, BackendConfig>,
}

/// Configuration for a single backend
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Native wire format spoken by the backend
    pub format: WireFormat,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
}

/// Wire formats a backend can speak natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// OpenAI chat completions
    Openai,
    /// Anthropic Messages body as accepted by Bedrock `InvokeModel`
    BedrockClaude,
    /// Amazon Titan text generation body
    BedrockTitan,
}

/// Model configuration for a backend
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Include models matching these patterns (regex)
    #[serde(default)]
    pub include: Vec<String>,
    /// Exclude models matching these patterns (regex)
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Per-model overrides
    #[serde(default)]
    pub overrides: HashMap<String, ModelOverride>,
}

/// Per-model configuration overrides
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    /// Name callers may use instead of the backend's model id
    #[serde(default)]
    pub alias: Option<String>,
}
