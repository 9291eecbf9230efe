//! Error types for agentpulse-core

use thiserror::Error;

/// Main error type for the agentpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error (frame encoding or a dropped connection)
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream agent runtime failure
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Session not found in the execution registry
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias for agentpulse-core
pub type Result<T> = std::result::Result<T, Error>;
