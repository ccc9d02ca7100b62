//! Error types shared across FitCMS components

use thiserror::Error;

/// Result type alias for FitCMS operations
pub type Result<T> = std::result::Result<T, CmsError>;

/// Main error type for FitCMS
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
