//! Error types for siege-core

use crate::scene::SceneError;
use thiserror::Error;

/// Core error type
///
/// Only collaborator failures that the embedding shell must react to are
/// surfaced here. Dropped events and missing references are reported as data
/// (see [`crate::DroppedEvent`]), never as errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Scene initialization failed: {0}")]
    SceneInit(#[from] SceneError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Target source error: {0}")]
    Source(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
