//! HTTP server for the shelf file service.
//!
//! This crate provides the HTTP surface:
//! - Whole-file and chunked resumable uploads
//! - Upload resume and revert endpoints
//! - Token-gated download and preview streaming
//! - File protection management (protect/unprotect/list)
//! - Per-client rate limiting

pub mod access;
pub mod error;
pub mod handlers;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use state::AppState;
