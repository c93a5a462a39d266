use concord_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Errors raised while translating or dispatching a request
#[derive(Debug, Error)]
pub enum LlmError {
    /// Inbound body failed schema validation or could not be classified
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Requested model is not served by any configured backend
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Named backend does not exist or has no registered client
    #[error("backend not found: {backend}")]
    BackendNotFound { backend: String },

    /// Backend returned a failure
    #[error("backend error: {message}")]
    Backend {
        /// Status reported by the backend, when it has one
        status: Option<u16>,
        /// Message reported by the backend
        message: String,
    },

    /// Backend stream failed after it started
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Shorthand for a malformed-request error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }

    /// Wrap a backend failure that carries no status
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::ModelNotFound { .. } | Self::BackendNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Backend { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Streaming(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::MalformedRequest(_) => "invalid_request_error",
            Self::ModelNotFound { .. } | Self::BackendNotFound { .. } => "not_found_error",
            Self::Backend { .. } => "api_error",
            Self::Streaming(_) => "streaming_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
