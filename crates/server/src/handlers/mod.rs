//! HTTP request handlers.

pub mod download;
pub mod files;
pub mod uploads;

pub use download::*;
pub use files::*;
pub use uploads::*;

use crate::error::{ApiError, ApiResult};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde::de::DeserializeOwned;

/// Upper bound for control-plane request bodies (JSON, upload IDs).
/// File payloads are limited separately by `server.max_body_bytes`.
const MAX_CONTROL_BODY: usize = 64 * 1024;

/// Health check endpoint. Unauthenticated and unlimited so load
/// balancers can probe it freely.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Read and deserialize a JSON request body.
pub(crate) async fn read_json<T: DeserializeOwned>(req: Request<Body>) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_CONTROL_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Read a small plain-text request body.
pub(crate) async fn read_text(req: Request<Body>) -> ApiResult<String> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_CONTROL_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {e}")))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ApiError::BadRequest("request body is not valid UTF-8".into()))
}
