//! Error types for CoCDB

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for CoCDB
pub type Result<T> = std::result::Result<T, Error>;

/// CoCDB errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache constructed with a zero or out-of-range TTL or sweep interval
    #[error("Invalid cache duration {0:?}: must be greater than zero and at most 100 years")]
    InvalidTtl(Duration),

    /// No async runtime available for background work
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Requested directory or document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request path escapes the data directory or is malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Document on disk is not valid JSON
    #[error("Invalid JSON in: {0}")]
    InvalidJson(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error surfaces as
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::InvalidPath(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
