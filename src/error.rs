//! Error types for the context optimization engine

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by the context engine
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("No compressor configured")]
    CompressorUnavailable,

    #[error("Dependency analysis cancelled after {parsed} of {total} files")]
    Cancelled { parsed: usize, total: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
