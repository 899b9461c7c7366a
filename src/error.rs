//! Error types for the file share server.

use thiserror::Error;

/// Common error type for the file share server.
#[derive(Error, Debug)]
pub enum FileShareError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user or config input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for file share operations.
pub type Result<T> = std::result::Result<T, FileShareError>;
