//! Bidirectional conversion between canonical types and wire formats
//!
//! Each submodule handles one external format: request, response, stream and
//! error-body conversions. The shared pieces live here.

pub mod claude;
pub mod finish;
pub mod openai;
pub mod titan;

use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::detect::FormatKind;
use crate::error::LlmError;
use crate::types::{CompletionChunk, CompletionParams};

/// Ordered native events, as JSON values in a backend's or caller's format
pub type NativeStream = Pin<Box<dyn Stream<Item = Result<Value, LlmError>> + Send>>;

/// Ordered canonical chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, LlmError>> + Send>>;

/// A field that has no equivalent in the target format and is dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedConversion {
    /// Format being converted to or from
    pub format: FormatKind,
    /// Dropped field
    pub field: Cow<'static, str>,
}

impl UnsupportedConversion {
    pub const fn new(format: FormatKind, field: &'static str) -> Self {
        Self {
            format,
            field: Cow::Borrowed(field),
        }
    }

    /// Drop of a field named by the caller's body rather than a known key
    pub fn unmodeled(format: FormatKind, field: impl Into<String>) -> Self {
        Self {
            format,
            field: Cow::Owned(field.into()),
        }
    }

    /// Emit the structured warning for this drop
    pub fn record(self) {
        tracing::warn!(
            unsupported_conversion = true,
            format = %self.format,
            field = %self.field,
            "dropping field with no equivalent in target format"
        );
    }
}

/// Serialize a wire struct into a JSON value
///
/// Wire structs only hold strings, numbers and JSON values, so this cannot
/// fail in practice; a failure is logged and yields `null`.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize wire body");
        Value::Null
    })
}

/// Fresh identifier for responses whose backend format carries none
pub(crate) fn response_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Log the `OpenAI`-only generation parameters a target format cannot carry
pub(crate) fn record_openai_only_params(params: &CompletionParams, format: FormatKind) {
    let dropped = [
        (params.frequency_penalty.is_some(), "frequency_penalty"),
        (params.presence_penalty.is_some(), "presence_penalty"),
        (params.seed.is_some(), "seed"),
        (params.user.is_some(), "user"),
    ];

    for (_, field) in dropped.into_iter().filter(|(present, _)| *present) {
        UnsupportedConversion::new(format, field).record();
    }
}

/// Render a tool result payload (string or list of blocks) as plain text
pub(crate) fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(other) => other.to_string(),
    }
}

/// Per-format state machine turning native events into canonical chunks
pub(crate) trait ChunkDecoder: Send + 'static {
    /// Decode one native event into the chunks it produces
    fn decode(&mut self, event: Value) -> Result<Vec<CompletionChunk>, LlmError>;

    /// Whether the terminal chunk has been produced
    fn is_finished(&self) -> bool;

    /// Terminal chunk for a native stream that ended without a termination signal
    fn finish(&mut self) -> CompletionChunk;
}

struct DecodeState<D> {
    native: NativeStream,
    decoder: D,
    pending: VecDeque<CompletionChunk>,
    done: bool,
}

/// Drive a decoder over a native stream, one event per poll
///
/// The native stream is not polled again once the terminal chunk has been
/// produced or an error was yielded.
pub(crate) fn decode_with<D: ChunkDecoder>(native: NativeStream, decoder: D) -> ChunkStream {
    let state = DecodeState {
        native,
        decoder,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.done {
                return None;
            }

            match state.native.next().await {
                Some(Ok(event)) => match state.decoder.decode(event) {
                    Ok(chunks) => {
                        state.pending.extend(chunks);
                        state.done = state.decoder.is_finished();
                    }
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    if !state.decoder.is_finished() {
                        tracing::debug!("backend stream ended without termination signal");
                        let terminal = state.decoder.finish();
                        state.pending.push_back(terminal);
                    }
                }
            }
        }
    }))
}

/// Per-format state machine turning canonical chunks into native events
pub(crate) trait ChunkEncoder: Send + 'static {
    /// Encode one chunk into zero or more native events
    fn encode(&mut self, chunk: CompletionChunk) -> Vec<Value>;
}

/// Drive an encoder over a chunk stream; errors pass through in order
pub(crate) fn encode_with<E: ChunkEncoder>(chunks: ChunkStream, encoder: E) -> NativeStream {
    let events = chunks
        .scan(encoder, |encoder, item| {
            let out: Vec<Result<Value, LlmError>> = match item {
                Ok(chunk) => encoder.encode(chunk).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures_util::future::ready(Some(out))
        })
        .flat_map(futures_util::stream::iter);

    Box::pin(events)
}

#[cfg(test)]
pub(crate) mod test_support {
    use futures_util::StreamExt;
    use serde_json::Value;

    use super::{ChunkStream, NativeStream};
    use crate::error::LlmError;
    use crate::types::CompletionChunk;

    /// Native stream over fixed events
    pub fn native(events: Vec<Value>) -> NativeStream {
        Box::pin(futures_util::stream::iter(events.into_iter().map(Ok::<_, LlmError>)))
    }

    /// Chunk stream over fixed chunks
    pub fn chunks(chunks: Vec<CompletionChunk>) -> ChunkStream {
        Box::pin(futures_util::stream::iter(chunks.into_iter().map(Ok::<_, LlmError>)))
    }

    /// Collect a chunk stream, panicking on errors
    pub async fn collect_chunks(stream: ChunkStream) -> Vec<CompletionChunk> {
        stream.map(|c| c.expect("chunk")).collect().await
    }

    /// Collect a native stream, panicking on errors
    pub async fn collect_events(stream: NativeStream) -> Vec<Value> {
        stream.map(|e| e.expect("event")).collect().await
    }
}
