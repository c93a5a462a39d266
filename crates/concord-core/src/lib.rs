//! Shared building blocks for the Concord workspace

mod error;

pub use error::HttpError;
