//! Axum routes exposing the translation core over HTTP
//!
//! One chat-completion endpoint accepts any supported format. The
//! Bedrock-style routes take the model from the path, as Bedrock
//! `InvokeModel` callers expect.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use concord_core::HttpError;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::backend::BackendSelector;
use crate::convert::NativeStream;
use crate::detect::FormatKind;
use crate::dispatch::{self, DispatchFailure, DispatchOutput, DispatchResponse, Dispatcher};
use crate::error::LlmError;
use crate::protocol::openai::STREAM_DONE;

/// Shared state for the LLM routes
#[derive(Clone)]
pub struct LlmState {
    /// Translation pipeline
    pub dispatcher: Arc<Dispatcher>,
    /// Model-to-backend resolution
    pub selector: Arc<dyn BackendSelector>,
}

impl LlmState {
    pub fn new(dispatcher: Dispatcher, selector: Arc<dyn BackendSelector>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            selector,
        }
    }
}

/// Build the LLM router with all endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        // Bedrock-compatible endpoints
        .route("/model/{model}/invoke", routing::post(invoke))
        .route("/model/{model}/invoke-with-response-stream", routing::post(invoke_with_response_stream))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(State(state): State<LlmState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(rejection) => return rejection_response(&rejection),
    };

    respond(state.dispatcher.handle(raw, state.selector.as_ref()).await)
}

/// Handle `POST /model/{model}/invoke`
async fn invoke(
    State(state): State<LlmState>,
    Path(model): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(rejection) => return rejection_response(&rejection),
    };

    respond(
        state
            .dispatcher
            .handle_for_model(raw, &model, false, state.selector.as_ref())
            .await,
    )
}

/// Handle `POST /model/{model}/invoke-with-response-stream`
async fn invoke_with_response_stream(
    State(state): State<LlmState>,
    Path(model): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(rejection) => return rejection_response(&rejection),
    };

    respond(
        state
            .dispatcher
            .handle_for_model(raw, &model, true, state.selector.as_ref())
            .await,
    )
}

fn respond(result: Result<DispatchResponse, DispatchFailure>) -> Response {
    match result {
        Ok(DispatchResponse {
            format,
            output: DispatchOutput::Json(body),
        }) => {
            tracing::debug!(format = %format, "sending response");
            Json(body).into_response()
        }
        Ok(DispatchResponse {
            format,
            output: DispatchOutput::Stream(events),
        }) => sse_response(format, events).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

fn failure_response(failure: &DispatchFailure) -> Response {
    if failure.error.is_client_error() {
        tracing::debug!(format = %failure.format, error = %failure.error, "rejected request");
    } else {
        tracing::warn!(format = %failure.format, error = %failure.error, "request failed");
    }

    (failure.status(), Json(failure.body())).into_response()
}

/// Body was not JSON; the format is unknowable, so the `OpenAI` error shape is used
fn rejection_response(rejection: &JsonRejection) -> Response {
    let failure = DispatchFailure::new(FormatKind::Unknown, LlmError::malformed(rejection.body_text()));
    failure_response(&failure)
}

/// Stream translated events as server-sent events
///
/// Claude events are named after their `type`. `OpenAI` streams end with
/// the `[DONE]` sentinel. A mid-stream failure becomes one error event in
/// the caller's format.
fn sse_response(format: FormatKind, events: NativeStream) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = events.map(move |result| match result {
        Ok(event) => Ok(sse_event(format, &event)),
        Err(e) => {
            tracing::warn!(format = %format, error = %e, "stream failed");
            let event = Event::default().data(dispatch::error_body(format, &e).to_string());
            Ok(if format == FormatKind::BedrockClaude {
                event.event("error")
            } else {
                event
            })
        }
    });

    let done = (format == FormatKind::OpenAi).then(|| Ok(Event::default().data(STREAM_DONE)));

    Sse::new(events.chain(futures_util::stream::iter(done))).keep_alive(KeepAlive::default())
}

fn sse_event(format: FormatKind, event: &Value) -> Event {
    let sse = Event::default().data(event.to_string());

    match event.get("type").and_then(Value::as_str) {
        Some(name) if format == FormatKind::BedrockClaude => sse.event(name),
        _ => sse,
    }
}
