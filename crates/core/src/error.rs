//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing file name")]
    MissingFileName,

    #[error("illegal file name: {0}")]
    IllegalFileName(String),

    #[error("path traversal blocked: {0}")]
    PathTraversal(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
