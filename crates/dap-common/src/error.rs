//! Error types for DAP

use thiserror::Error;

/// Result type alias for DAP operations
pub type Result<T> = std::result::Result<T, DapError>;

/// Main error type for DAP
#[derive(Error, Debug)]
pub enum DapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Prompt template error: {0}")]
    Prompt(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
