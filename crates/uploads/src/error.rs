//! Error types for the upload engine.

use thiserror::Error;

/// Upload engine error type.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("coverage gap: combined data ends at byte {covered}, next chunk starts at {offset}")]
    Gap { covered: u64, offset: u64 },

    #[error("chunk at offset {offset} with {len} bytes exceeds the declared length {total}")]
    OutOfRange { offset: u64, len: u64, total: u64 },

    #[error("incomplete upload: declared length {total} but contiguous data ends at byte {covered}")]
    Short { covered: u64, total: u64 },

    #[error("first chunk of a session must declare the total upload length")]
    MissingLength,

    #[error("first chunk of a session must declare the target file name")]
    MissingTarget,
}

/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;
