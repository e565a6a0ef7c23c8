//! Error types for siege-live

use thiserror::Error;

/// Live channel error type
#[derive(Debug, Error)]
pub enum Error {
    /// Stage or configuration failure
    #[error(transparent)]
    Core(#[from] siege_core::Error),

    /// Inbound queue overflow
    #[error("Inbox full, dropping message")]
    InboxFull,

    /// Message could not be decoded or encoded
    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Push channel failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Invalid live configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for live operations
pub type Result<T> = std::result::Result<T, Error>;
