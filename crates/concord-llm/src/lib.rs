//! Protocol classification and translation core for Concord
//!
//! Classifies inbound chat requests as `OpenAI`, Bedrock Claude, or Bedrock
//! Titan bodies, translates them into one canonical representation,
//! dispatches them to a configured backend, and renders the backend's
//! response or stream back in the caller's original format.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod backend;
pub mod convert;
pub mod detect;
pub mod dispatch;
pub mod error;
#[cfg(feature = "http")]
pub mod handler;
pub mod protocol;
pub mod types;

pub use adapter::{FormatAdapter, adapter_for};
pub use backend::{Backend, BackendRegistry, BackendRequest, BackendSelector, SelectedBackend};
pub use convert::{ChunkStream, NativeStream, UnsupportedConversion};
pub use detect::{ConfidenceScores, FormatKind, confidence, detect};
pub use dispatch::{DispatchFailure, DispatchOutput, DispatchResponse, Dispatcher};
pub use error::LlmError;
#[cfg(feature = "http")]
pub use handler::{LlmState, llm_router};
pub use types::{CompletionChunk, CompletionRequest, CompletionResponse};
