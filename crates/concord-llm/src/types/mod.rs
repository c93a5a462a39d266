//! Canonical, provider-neutral request/response/chunk representation
//!
//! Every wire format converts to and from these types. They carry no logic
//! beyond small constructors and invariant checks.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall};
pub use request::{CompletionParams, CompletionRequest};
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage, unix_now};
pub use stream::{ChunkChoice, ChunkDelta, CompletionChunk, StreamFunctionCall, StreamToolCall};
pub use tool::{ToolChoice, ToolDefinition};
