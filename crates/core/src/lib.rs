//! Core types and shared logic for the shelf file server.
//!
//! This crate defines what the other crates agree on:
//! - Configuration structure and defaults
//! - File name validation rules
//! - Shared error type

pub mod config;
pub mod error;
pub mod filename;

pub use config::AppConfig;
pub use error::{Error, Result};

/// Maximum accepted file name length, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;
