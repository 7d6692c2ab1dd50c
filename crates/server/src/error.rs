//! API error types.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Error body shared by every failing response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// When the error was produced (RFC 3339).
    pub timestamp: String,
    /// HTTP status code, repeated in the body.
    pub status: u16,
    /// Canonical reason phrase for the status.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Seconds to wait before retrying, present on 429 responses.
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Missing or wrong basic auth credentials. Responds 401 with a
    /// `WWW-Authenticate` challenge, unlike token failures.
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] shelf_core::Error),

    #[error(transparent)]
    Tokens(#[from] shelf_tokens::TokenStoreError),

    #[error(transparent)]
    Upload(#[from] shelf_uploads::UploadError),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Io(_) | Self::Tokens(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(e) => match e {
                shelf_core::Error::PathTraversal(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Upload(e) => match e {
                shelf_uploads::UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }

    /// Canonical reason phrase used in the `error` body field.
    pub fn label(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::TOO_MANY_REQUESTS => "Too Many Requests",
            _ => "Internal Server Error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let retry_after = match &self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorResponse {
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            status: status.as_u16(),
            error: self.label().to_string(),
            message: self.to_string(),
            retry_after,
        };

        match (retry_after, matches!(self, Self::InvalidCredentials(_))) {
            (Some(secs), _) => (
                status,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(body),
            )
                .into_response(),
            (None, true) => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"shelf\"".to_string())],
                Json(body),
            )
                .into_response(),
            (None, false) => (status, Json(body)).into_response(),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::RateLimited {
                retry_after_secs: 3
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Core(shelf_core::Error::PathTraversal("../x".into())).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Core(shelf_core::Error::MissingFileName).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Upload(shelf_uploads::UploadError::Gap {
                covered: 0,
                offset: 5
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn labels_match_status() {
        assert_eq!(ApiError::NotFound("x".into()).label(), "Not Found");
        assert_eq!(
            ApiError::InvalidCredentials("x".into()).label(),
            "Unauthorized"
        );
        assert_eq!(ApiError::Internal("x".into()).label(), "Internal Server Error");
    }
}
