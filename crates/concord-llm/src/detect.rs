//! Structural classification of inbound request bodies
//!
//! [`detect`] is the authoritative classifier; [`confidence`] is an advisory
//! score used for diagnostics only.

use serde::Serialize;
use serde_json::{Map, Value};

/// Wire format of a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FormatKind {
    /// `OpenAI` chat completions
    #[strum(serialize = "openai")]
    OpenAi,
    /// Anthropic Messages body as accepted by Bedrock
    BedrockClaude,
    /// Amazon Titan text generation body
    BedrockTitan,
    /// Nothing matched
    Unknown,
}

/// Fields that only appear in Claude bodies
const CLAUDE_FIELDS: [&str; 3] = ["system", "top_k", "stop_sequences"];

/// `textGenerationConfig` keys that mark a Titan body
const TITAN_CONFIG_FIELDS: [&str; 4] = ["maxTokenCount", "temperature", "topP", "stopSequences"];

/// Parameters that identify an `OpenAI` body lacking `model`
const OPENAI_PARAMS: [&str; 9] = [
    "temperature",
    "max_tokens",
    "top_p",
    "frequency_penalty",
    "presence_penalty",
    "stop",
    "stream",
    "logit_bias",
    "user",
];

/// Classify a raw request body
///
/// Total and deterministic. Claude is tested before Titan before `OpenAI`,
/// each test short-circuiting.
pub fn detect(raw: &Value) -> FormatKind {
    let Some(obj) = raw.as_object() else {
        return FormatKind::Unknown;
    };

    if is_claude(obj) {
        FormatKind::BedrockClaude
    } else if is_titan(obj) {
        FormatKind::BedrockTitan
    } else if is_openai(obj) || (has_messages(obj) && !has_foreign_markers(obj)) {
        FormatKind::OpenAi
    } else {
        FormatKind::Unknown
    }
}

fn has_messages(obj: &Map<String, Value>) -> bool {
    obj.get("messages").is_some_and(Value::is_array)
}

fn has_titan_envelope(obj: &Map<String, Value>) -> bool {
    obj.get("inputText").is_some_and(Value::is_string) && obj.get("textGenerationConfig").is_some_and(Value::is_object)
}

/// Markers of a Bedrock body that rule out `OpenAI`
fn has_foreign_markers(obj: &Map<String, Value>) -> bool {
    obj.contains_key("anthropic_version") || has_titan_envelope(obj)
}

fn has_claude_tools(obj: &Map<String, Value>) -> bool {
    obj.get("tools").and_then(Value::as_array).is_some_and(|tools| {
        tools.iter().any(|tool| {
            tool.get("input_schema").is_some() && tool.get("name").is_some() && tool.get("description").is_some()
        })
    })
}

/// `tool_choice` shaped as a Claude object
///
/// `OpenAI` named choices are objects with a type too, but always `"function"`.
fn has_claude_tool_choice(obj: &Map<String, Value>) -> bool {
    obj.get("tool_choice")
        .and_then(Value::as_object)
        .and_then(|choice| choice.get("type"))
        .is_some_and(|kind| kind.as_str() != Some("function"))
}

fn has_function_tools(obj: &Map<String, Value>) -> bool {
    obj.get("tools").and_then(Value::as_array).is_some_and(|tools| {
        tools.iter().any(|tool| {
            tool.get("type").and_then(Value::as_str) == Some("function") && tool.get("function").is_some_and(Value::is_object)
        })
    })
}

fn is_claude(obj: &Map<String, Value>) -> bool {
    if obj.contains_key("anthropic_version") {
        return true;
    }

    if !(obj.contains_key("max_tokens") && has_messages(obj)) {
        return false;
    }

    CLAUDE_FIELDS.iter().any(|field| obj.contains_key(*field)) || has_claude_tools(obj) || has_claude_tool_choice(obj)
}

fn is_titan(obj: &Map<String, Value>) -> bool {
    has_titan_envelope(obj)
        && obj
            .get("textGenerationConfig")
            .and_then(Value::as_object)
            .is_some_and(|config| TITAN_CONFIG_FIELDS.iter().any(|field| config.contains_key(*field)))
}

fn is_openai(obj: &Map<String, Value>) -> bool {
    if has_foreign_markers(obj) || !has_messages(obj) {
        return false;
    }

    obj.contains_key("model") || OPENAI_PARAMS.iter().any(|field| obj.contains_key(*field)) || has_function_tools(obj)
}

/// Advisory per-format likelihood, each in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfidenceScores {
    /// `OpenAI` score
    pub openai: f64,
    /// Bedrock Claude score
    pub claude: f64,
    /// Bedrock Titan score
    pub titan: f64,
}

impl ConfidenceScores {
    /// Format with the highest score, `Unknown` when every score is zero
    pub fn best(&self) -> FormatKind {
        let ranked = [
            (FormatKind::BedrockClaude, self.claude),
            (FormatKind::BedrockTitan, self.titan),
            (FormatKind::OpenAi, self.openai),
        ];

        ranked
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .fold(None, |best: Option<(FormatKind, f64)>, (kind, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((kind, score)),
            })
            .map_or(FormatKind::Unknown, |(kind, _)| kind)
    }
}

/// Sum the weights of the signals present, clamped to 1.0
fn score(signals: &[(bool, f64)]) -> f64 {
    signals
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, weight)| weight)
        .sum::<f64>()
        .min(1.0)
}

/// Score how strongly a body resembles each format
///
/// Never consulted by [`detect`].
pub fn confidence(raw: &Value) -> ConfidenceScores {
    let Some(obj) = raw.as_object() else {
        return ConfidenceScores::default();
    };

    let messages = has_messages(obj);
    let config = obj.get("textGenerationConfig").and_then(Value::as_object);
    let config_has = |field: &str| config.is_some_and(|c| c.contains_key(field));

    let claude = score(&[
        (obj.contains_key("anthropic_version"), 0.6),
        (obj.contains_key("max_tokens"), 0.1),
        (messages, 0.1),
        (obj.contains_key("system"), 0.15),
        (obj.contains_key("top_k"), 0.15),
        (obj.contains_key("stop_sequences"), 0.1),
        (has_claude_tools(obj), 0.2),
        (has_claude_tool_choice(obj), 0.1),
    ]);

    let titan = score(&[
        (obj.get("inputText").is_some_and(Value::is_string), 0.4),
        (config.is_some(), 0.3),
        (config_has("maxTokenCount"), 0.2),
        (config_has("temperature"), 0.1),
        (config_has("topP"), 0.1),
        (config_has("stopSequences"), 0.1),
    ]);

    let openai = if has_foreign_markers(obj) {
        0.0
    } else {
        let mut signals = vec![(messages, 0.3), (obj.contains_key("model"), 0.3), (has_function_tools(obj), 0.2)];
        signals.extend(OPENAI_PARAMS.iter().map(|field| (obj.contains_key(*field), 0.05)));
        score(&signals)
    };

    ConfidenceScores { openai, claude, titan }
}
