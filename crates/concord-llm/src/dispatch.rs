//! Request dispatch: classify, translate, invoke, translate back

use std::fmt;

use concord_config::LlmConfig;
use concord_core::HttpError;
use futures_util::TryStreamExt;
use http::StatusCode;
use serde_json::Value;

use crate::adapter::{FormatAdapter, adapter_for};
use crate::backend::{BackendRequest, BackendSelector, SelectedBackend};
use crate::convert::{ChunkStream, NativeStream, openai};
use crate::detect::{FormatKind, confidence, detect};
use crate::error::LlmError;

/// Translated output of a dispatched request
pub enum DispatchOutput {
    /// Complete response body
    Json(Value),
    /// Event stream, each item a valid JSON event
    Stream(NativeStream),
}

impl fmt::Debug for DispatchOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(body) => f.debug_tuple("Json").field(body).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Successful dispatch, rendered in the caller's format
#[derive(Debug)]
pub struct DispatchResponse {
    /// Format the caller spoke
    pub format: FormatKind,
    /// Response body or event stream
    pub output: DispatchOutput,
}

/// Failed dispatch, with the format to render the error in
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DispatchFailure {
    /// Format the caller spoke; `Unknown` when classification failed
    pub format: FormatKind,
    /// Underlying error
    #[source]
    pub error: LlmError,
}

impl DispatchFailure {
    pub const fn new(format: FormatKind, error: LlmError) -> Self {
        Self { format, error }
    }

    /// HTTP status for the failure
    pub fn status(&self) -> StatusCode {
        self.error.status_code()
    }

    /// Error body in the caller's format
    pub fn body(&self) -> Value {
        error_body(self.format, &self.error)
    }
}

/// Render an error in a format's error shape
///
/// Unclassified callers get the `OpenAI` shape.
pub fn error_body(format: FormatKind, error: &LlmError) -> Value {
    adapter_for(format).map_or_else(|| openai::error_body(error), |adapter| (adapter.error_body)(error))
}

/// Stateless translation pipeline shared by all requests
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    default_model: Option<String>,
    log_confidence: bool,
}

impl Dispatcher {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            log_confidence: config.log_confidence,
        }
    }

    /// Dispatch a request; the body's own `stream` flag selects the chunked path
    pub async fn handle(
        &self,
        raw: Value,
        selector: &dyn BackendSelector,
    ) -> Result<DispatchResponse, DispatchFailure> {
        self.dispatch(raw, None, false, selector).await
    }

    /// Dispatch a request on the chunked path regardless of its `stream` flag
    pub async fn handle_stream(
        &self,
        raw: Value,
        selector: &dyn BackendSelector,
    ) -> Result<DispatchResponse, DispatchFailure> {
        self.dispatch(raw, None, true, selector).await
    }

    /// Dispatch a request whose model is given outside the body
    ///
    /// Bedrock-style callers name the model in the URL path; it takes
    /// precedence over any model in the body.
    pub async fn handle_for_model(
        &self,
        raw: Value,
        model: &str,
        stream: bool,
        selector: &dyn BackendSelector,
    ) -> Result<DispatchResponse, DispatchFailure> {
        self.dispatch(raw, Some(model), stream, selector).await
    }

    async fn dispatch(
        &self,
        raw: Value,
        model: Option<&str>,
        force_stream: bool,
        selector: &dyn BackendSelector,
    ) -> Result<DispatchResponse, DispatchFailure> {
        let format = detect(&raw);
        tracing::debug!(format = %format, "classified request");

        if self.log_confidence {
            let scores = confidence(&raw);
            tracing::debug!(
                format = %format,
                openai = scores.openai,
                claude = scores.claude,
                titan = scores.titan,
                best = %scores.best(),
                "format confidence"
            );
        }

        let fail = |error| DispatchFailure::new(format, error);

        let caller = adapter_for(format)
            .ok_or_else(|| fail(LlmError::malformed("request body does not match any supported format")))?;

        let mut request = (caller.request_to_canonical)(raw).map_err(fail)?;

        if let Some(model) = model {
            request.model = model.to_owned();
        }
        if request.model.is_empty() {
            request.model = self
                .default_model
                .clone()
                .ok_or_else(|| fail(LlmError::malformed("request has no model and no default model is configured")))?;
        }
        request.stream |= force_stream;

        let selected = selector.select(&request.model).map_err(fail)?;
        let backend_format = selected.backend.format();
        let backend = adapter_for(backend_format).ok_or_else(|| {
            fail(LlmError::Internal(anyhow::anyhow!(
                "backend '{}' has no usable wire format",
                selected.backend.name()
            )))
        })?;

        request.model.clone_from(&selected.model);
        let backend_request = BackendRequest {
            model: selected.model.clone(),
            body: (backend.request_from_canonical)(&request),
        };

        tracing::info!(
            format = %format,
            backend = selected.backend.name(),
            backend_format = %backend_format,
            model = %selected.model,
            stream = request.stream,
            "dispatching request"
        );

        let output = if request.stream {
            DispatchOutput::Stream(Self::stream(caller, backend, &selected, backend_request).await.map_err(fail)?)
        } else {
            DispatchOutput::Json(Self::complete(caller, backend, &selected, backend_request).await.map_err(fail)?)
        };

        Ok(DispatchResponse { format, output })
    }

    async fn complete(
        caller: &FormatAdapter,
        backend: &FormatAdapter,
        selected: &SelectedBackend,
        request: BackendRequest,
    ) -> Result<Value, LlmError> {
        let body = selected
            .backend
            .invoke(request)
            .await
            .inspect_err(|e| log_backend_failure(selected, e))?;

        let mut response = (backend.response_to_canonical)(body)?;
        if response.model.is_empty() {
            response.model.clone_from(&selected.model);
        }

        Ok((caller.response_from_canonical)(response))
    }

    async fn stream(
        caller: &FormatAdapter,
        backend: &FormatAdapter,
        selected: &SelectedBackend,
        request: BackendRequest,
    ) -> Result<NativeStream, LlmError> {
        let native = selected
            .backend
            .invoke_stream(request)
            .await
            .inspect_err(|e| log_backend_failure(selected, e))?;

        let model = selected.model.clone();
        let chunks: ChunkStream = Box::pin((backend.decode_stream)(native).map_ok(move |mut chunk| {
            if chunk.model.is_empty() {
                chunk.model.clone_from(&model);
            }
            chunk
        }));

        Ok((caller.encode_stream)(chunks))
    }
}

fn log_backend_failure(selected: &SelectedBackend, error: &LlmError) {
    tracing::warn!(
        backend = selected.backend.name(),
        model = %selected.model,
        error = %error,
        "backend request failed"
    );
}
