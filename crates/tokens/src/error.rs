//! Error types for token document handling.

use thiserror::Error;

/// Token store error type.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid token document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("token document root must be a JSON object")]
    NotAnObject,

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Result type alias for token store operations.
pub type Result<T> = std::result::Result<T, TokenStoreError>;
