//! Error types for the ingestion core.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during stream processing.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error from the index store.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error from the identity resolver.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Event decoding error from the core crate.
    #[error(transparent)]
    Core(#[from] porchlight_core::Error),

    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The event channel closed while a source was still producing.
    #[error("event channel closed")]
    ChannelClosed,
}
