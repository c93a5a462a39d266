//! Backend boundary and model-to-backend routing
//!
//! Backends are external collaborators that take a body in their native
//! wire format and return one, or a stream of native events. The registry
//! resolves a requested model name to the backend that serves it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use concord_config::{LlmConfig, WireFormat};
use regex::Regex;
use serde_json::Value;

use crate::convert::NativeStream;
use crate::detect::FormatKind;
use crate::error::LlmError;

/// Body handed to a backend
///
/// Bedrock bodies do not carry the model, so it travels alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// Model identifier as the backend knows it
    pub model: String,
    /// Request body in the backend's native format
    pub body: Value,
}

/// A model provider reachable in one native wire format
#[async_trait]
pub trait Backend: Send + Sync {
    /// Configured backend name
    fn name(&self) -> &str;

    /// Native wire format of request and response bodies
    fn format(&self) -> FormatKind;

    /// Send a request and return the terminal response body
    async fn invoke(&self, request: BackendRequest) -> Result<Value, LlmError>;

    /// Send a request and return the backend's native event stream
    async fn invoke_stream(&self, request: BackendRequest) -> Result<NativeStream, LlmError>;
}

/// Backend chosen for a model, with the model id to send it
#[derive(Clone)]
pub struct SelectedBackend {
    /// Backend client
    pub backend: Arc<dyn Backend>,
    /// Model identifier after alias resolution
    pub model: String,
}

impl fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("backend", &self.backend.name())
            .field("format", &self.backend.format())
            .field("model", &self.model)
            .finish()
    }
}

/// Resolves a model name to a backend
pub trait BackendSelector: Send + Sync {
    fn select(&self, model: &str) -> Result<SelectedBackend, LlmError>;
}

impl From<WireFormat> for FormatKind {
    fn from(format: WireFormat) -> Self {
        match format {
            WireFormat::Openai => Self::OpenAi,
            WireFormat::BedrockClaude => Self::BedrockClaude,
            WireFormat::BedrockTitan => Self::BedrockTitan,
        }
    }
}

/// Routing-relevant configuration of one backend
struct BackendEntry {
    name: String,
    format: FormatKind,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    /// alias -> actual model id
    aliases: HashMap<String, String>,
    client: Option<Arc<dyn Backend>>,
}

impl BackendEntry {
    fn is_model_allowed(&self, model: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(model)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|re| re.is_match(model))
    }

    fn resolve_alias(&self, model: &str) -> Option<&str> {
        self.aliases.get(model).map(String::as_str)
    }

    fn selected(&self, model: String) -> Result<SelectedBackend, LlmError> {
        let backend = self.client.clone().ok_or_else(|| LlmError::BackendNotFound {
            backend: self.name.clone(),
        })?;

        tracing::debug!(backend = %self.name, model = %model, "resolved model to backend");
        Ok(SelectedBackend { backend, model })
    }
}

/// Configured backends in resolution order
///
/// Resolution accepts `backend/model` to pick a backend explicitly.
/// Otherwise aliases are checked first, then the first backend whose
/// include/exclude filters allow the model wins.
pub struct BackendRegistry {
    entries: Vec<BackendEntry>,
}

impl BackendRegistry {
    /// Build the routing table from configuration; clients are added with [`Self::register`]
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let entries = config
            .backends
            .iter()
            .map(|(name, backend)| {
                let compile = |patterns: &[String]| {
                    patterns
                        .iter()
                        .map(|p| Regex::new(p).with_context(|| format!("invalid model pattern '{p}' for backend '{name}'")))
                        .collect::<anyhow::Result<Vec<_>>>()
                };

                let aliases = backend
                    .models
                    .overrides
                    .iter()
                    .filter_map(|(model, o)| o.alias.as_ref().map(|alias| (alias.clone(), model.clone())))
                    .collect();

                Ok(BackendEntry {
                    name: name.clone(),
                    format: backend.format.into(),
                    include: compile(&backend.models.include)?,
                    exclude: compile(&backend.models.exclude)?,
                    aliases,
                    client: None,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    /// Attach the client for a configured backend
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> anyhow::Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == backend.name())
            .with_context(|| format!("backend '{}' is not configured", backend.name()))?;

        anyhow::ensure!(
            entry.format == backend.format(),
            "backend '{}' speaks {} but is configured as {}",
            entry.name,
            backend.format(),
            entry.format
        );

        tracing::debug!(backend = %entry.name, format = %entry.format, "registered backend");
        entry.client = Some(backend);
        Ok(())
    }

    /// Builder form of [`Self::register`]
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> anyhow::Result<Self> {
        self.register(backend)?;
        Ok(self)
    }

    /// Configured backend names in resolution order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

impl BackendSelector for BackendRegistry {
    fn select(&self, model: &str) -> Result<SelectedBackend, LlmError> {
        if let Some((backend_name, model_id)) = model.split_once('/')
            && let Some(entry) = self.entries.iter().find(|e| e.name == backend_name)
        {
            let actual = entry.resolve_alias(model_id).unwrap_or(model_id);
            if !entry.is_model_allowed(actual) {
                return Err(LlmError::ModelNotFound {
                    model: model.to_owned(),
                });
            }
            return entry.selected(actual.to_owned());
        }

        let available = || self.entries.iter().filter(|e| e.client.is_some());

        for entry in available() {
            if let Some(actual) = entry.resolve_alias(model)
                && entry.is_model_allowed(actual)
            {
                return entry.selected(actual.to_owned());
            }
        }

        if let Some(entry) = available().find(|e| e.is_model_allowed(model)) {
            return entry.selected(model.to_owned());
        }

        // A configured backend may match but have no client attached
        if let Some(entry) = self.entries.iter().find(|e| e.is_model_allowed(model)) {
            return Err(LlmError::BackendNotFound {
                backend: entry.name.clone(),
            });
        }

        Err(LlmError::ModelNotFound {
            model: model.to_owned(),
        })
    }
}
