//! Error types for siege-replay

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Replay error type
#[derive(Debug, Error)]
pub enum Error {
    /// Core engine error
    #[error("Core error: {0}")]
    Core(#[from] siege_core::Error),

    /// The log source reported a failure or returned an unusable payload
    #[error("Invalid log: {0}")]
    InvalidLog(String),

    /// Filter range with start after end
    #[error("Invalid date range: {0} .. {1}")]
    InvalidRange(DateTime<Utc>, DateTime<Utc>),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for replay operations
pub type Result<T> = std::result::Result<T, Error>;
