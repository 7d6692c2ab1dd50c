//! Request gating.
//!
//! Every inbound operation passes through one of the gates here before any
//! handler logic runs. The rate limiter is always consulted first, so a
//! blocked client receives 429 even when its credentials are wrong. The
//! API gate then checks basic auth against the users document; the
//! download gate resolves the requested file and checks its token rule.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::http::Request;
use axum::http::header::AUTHORIZATION;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use shelf_core::filename;
use std::path::{Path, PathBuf};

/// Count the request against the client's rate limit window.
pub fn check_rate_limit(state: &AppState, req: &Request<Body>) -> ApiResult<()> {
    let key = state.rate_limit.client_key(req);
    state.rate_limit.check(&key).map_err(|e| {
        tracing::warn!(client = %key, retry_after = e.retry_after_secs, "rate limit exceeded");
        ApiError::RateLimited {
            retry_after_secs: e.retry_after_secs,
        }
    })
}

/// Gate for credentialed operations: uploads and the management API.
///
/// Returns the authenticated username.
pub fn authorize_api(state: &AppState, req: &Request<Body>) -> ApiResult<String> {
    check_rate_limit(state, req)?;

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidCredentials("no authentication was specified".into()))?;
    let (username, password) = decode_basic(header)?;

    match state.users.get_str(&username) {
        Some(expected) if expected == password => Ok(username),
        _ => Err(ApiError::InvalidCredentials(
            "invalid username or password".into(),
        )),
    }
}

/// Gate for downloads: resolve the requested file and check its token rule.
///
/// A file with no entry in the token document is public. A protected file
/// requires the request token to be one of the file's accepted tokens.
pub fn authorize_download<'a>(
    state: &'a AppState,
    req: &Request<Body>,
    file_name: Option<&'a str>,
    token: Option<&'a str>,
) -> impl std::future::Future<Output = ApiResult<PathBuf>> + Send + 'a {
    // Desugared so the future does not capture `req`: `Request<Body>` is
    // not `Sync`, which would make the handler futures non-`Send`.
    let rate_limited = check_rate_limit(state, req);
    async move {
        rate_limited?;

        let name = file_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing fileName parameter".into()))?;
        let path = resolve_file_name(state, name)?;
        if !is_stored_file(&path).await {
            return Err(ApiError::NotFound("no file found with the given name".into()));
        }

        match state.file_tokens.get_tokens(name) {
            None => Ok(path),
            Some(accepted) => match token.map(str::trim).filter(|t| !t.is_empty()) {
                None => Err(ApiError::Unauthorized("no token was specified".into())),
                Some(t) if accepted.contains(t) => Ok(path),
                Some(_) => Err(ApiError::Unauthorized(
                    "the specified token is invalid".into(),
                )),
            },
        }
    }
}

/// Validate a client-supplied name and join it onto the files directory.
///
/// The joined path must resolve to a direct child of the files directory;
/// anything else is treated as traversal.
pub fn resolve_file_name(state: &AppState, name: &str) -> ApiResult<PathBuf> {
    filename::validate(name)?;
    let path = state.config.server.files_dir.join(name);
    if path.parent() != Some(state.config.server.files_dir.as_path()) {
        return Err(ApiError::Forbidden("directory traversal blocked".into()));
    }
    Ok(path)
}

/// Whether `path` names a stored regular file.
pub async fn is_stored_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn decode_basic(header: &str) -> ApiResult<(String, String)> {
    let encoded = header
        .get(..6)
        .filter(|prefix| prefix.eq_ignore_ascii_case("basic "))
        .map(|_| header[6..].trim())
        .ok_or_else(|| {
            ApiError::InvalidCredentials("only basic authentication is supported".into())
        })?;
    let decoded = BASE64
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| ApiError::InvalidCredentials("malformed basic auth header".into()))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| ApiError::InvalidCredentials("malformed basic auth header".into()))?;
    Ok((username.to_string(), password.to_string()))
}
