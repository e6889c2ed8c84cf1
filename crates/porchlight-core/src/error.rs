//! Error types shared across the Porchlight pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding commit events.
#[derive(Error, Debug)]
pub enum Error {
    /// An operation path does not follow the `collection/rkey` form.
    #[error("invalid operation path: {0}")]
    InvalidOpPath(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
