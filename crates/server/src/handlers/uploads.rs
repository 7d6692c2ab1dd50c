//! Upload endpoints: whole-file, chunked append, resume and revert.
//!
//! The wire protocol follows the resumable-upload convention used by
//! chunk-aware clients: a POST to `/api/upload/process` either carries the
//! whole file as a multipart part (single-pass) or no file at all, which
//! opens a chunked session whose ID is returned as plain text. Chunks then
//! arrive as PATCH bodies with `Upload-Offset`, plus `Upload-Length` and
//! `Upload-Name` on the first chunk.

use crate::access;
use crate::error::{ApiError, ApiResult};
use crate::handlers::read_text;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use shelf_uploads::{ChunkOutcome, UploadId, UploadSession};
use std::path::PathBuf;

const UPLOAD_LENGTH: &str = "upload-length";
const UPLOAD_NAME: &str = "upload-name";
const UPLOAD_OFFSET: &str = "upload-offset";

/// Query parameters for the patch endpoints.
#[derive(Debug, Deserialize)]
pub struct PatchQuery {
    /// The upload session ID handed out by `/api/upload/process`.
    pub patch: String,
}

/// POST /api/upload/process
///
/// Multipart with a file part: single-pass upload, stored immediately.
/// Multipart without one: opens a chunked session. Either way the
/// response body is the session ID as plain text.
pub async fn upload_process(
    State(state): State<AppState>,
    req: Request<Body>,
) -> ApiResult<Response> {
    access::authorize_api(&state, &req)?;

    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let target = resolve_new_target(&state, &file_name).await?;

        let mut session = UploadSession::create(&state.scratch_root).await?;
        let written = match store_whole(&mut session, target, &mut field).await {
            Ok(written) => written,
            Err(e) => {
                // Remove the partial target and release the scratch
                // directory, otherwise a retry of the same name hits a
                // spurious conflict with no session left to revert.
                if let Err(error) = session.revert().await {
                    tracing::warn!(
                        upload_id = %session.id(),
                        %error,
                        "failed to remove partial upload target"
                    );
                }
                session.close(&state.sweeper);
                return Err(e);
            }
        };

        let id = state.sessions.insert(session);
        tracing::info!(upload_id = %id, file = %file_name, bytes = written, "stored whole file");
        return Ok((StatusCode::OK, id.to_string()).into_response());
    }

    // No file part: open a chunked session.
    let session = UploadSession::create(&state.scratch_root).await?;
    let id = state.sessions.insert(session);
    tracing::info!(upload_id = %id, "opened chunked upload session");
    Ok((StatusCode::OK, id.to_string()).into_response())
}

/// PATCH /api/upload/patch?patch={id}
///
/// Append one chunk. The chunk whose end reaches the declared total
/// length completes the upload and removes the session.
pub async fn upload_patch(
    State(state): State<AppState>,
    Query(query): Query<PatchQuery>,
    req: Request<Body>,
) -> ApiResult<StatusCode> {
    access::authorize_api(&state, &req)?;

    let offset = parse_u64_header(req.headers(), UPLOAD_OFFSET)?
        .ok_or_else(|| ApiError::BadRequest("missing Upload-Offset header".into()))?;
    let total = parse_u64_header(req.headers(), UPLOAD_LENGTH)?;
    let target = match string_header(req.headers(), UPLOAD_NAME)? {
        Some(name) => Some(resolve_new_target(&state, &name).await?),
        None => None,
    };

    let id = parse_upload_id(&query.patch)?;
    let session = state.sessions.get(id).ok_or_else(invalid_upload_id)?;

    let body = axum::body::to_bytes(req.into_body(), state.config.server.max_body_bytes)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read chunk body: {e}")))?;

    let outcome = {
        let mut session = session.lock().await;
        session.append_chunk(offset, total, target, &body).await?
    };
    if outcome == ChunkOutcome::Completed {
        tracing::info!(upload_id = %id, "chunked upload completed");
        state.sessions.remove(id);
    }
    Ok(StatusCode::OK)
}

/// HEAD /api/upload/patch?patch={id}
///
/// Resume probe: reports the highest stored chunk offset in the
/// `Upload-Offset` response header.
pub async fn upload_head(
    State(state): State<AppState>,
    Query(query): Query<PatchQuery>,
    req: Request<Body>,
) -> ApiResult<Response> {
    access::authorize_api(&state, &req)?;

    let id = parse_upload_id(&query.patch)?;
    let session = state.sessions.get(id).ok_or_else(invalid_upload_id)?;
    let offset = session.lock().await.current_offset();

    Ok((StatusCode::OK, [(UPLOAD_OFFSET, offset.to_string())]).into_response())
}

/// POST|DELETE /api/upload/revert
///
/// Body is the session ID. Deletes whatever the session wrote and closes
/// it. Reverting a session that never wrote anything succeeds.
pub async fn upload_revert(
    State(state): State<AppState>,
    req: Request<Body>,
) -> ApiResult<StatusCode> {
    access::authorize_api(&state, &req)?;

    let body = read_text(req).await?;
    let id = parse_upload_id(&body)?;
    let session = state.sessions.get(id).ok_or_else(invalid_upload_id)?;

    session.lock().await.revert().await?;
    state.sessions.remove(id);
    tracing::info!(upload_id = %id, "reverted upload");
    Ok(StatusCode::OK)
}

/// Drain one multipart file field into the session's target file.
async fn store_whole(
    session: &mut UploadSession,
    target: PathBuf,
    field: &mut Field<'_>,
) -> ApiResult<u64> {
    let mut writer = session.begin_whole(target).await?;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload stream: {e}")))?
    {
        writer.write(&chunk).await?;
    }
    Ok(writer.finish().await?)
}

/// Resolve a client-supplied target name, rejecting names that already
/// have a stored file.
async fn resolve_new_target(state: &AppState, name: &str) -> ApiResult<PathBuf> {
    let target = access::resolve_file_name(state, name)?;
    if tokio::fs::try_exists(&target).await? {
        return Err(ApiError::Conflict(format!(
            "a file named '{name}' already exists"
        )));
    }
    Ok(target)
}

fn parse_upload_id(raw: &str) -> ApiResult<UploadId> {
    UploadId::parse(raw).ok_or_else(invalid_upload_id)
}

fn invalid_upload_id() -> ApiError {
    ApiError::Unauthorized("invalid upload id".into())
}

fn string_header(headers: &HeaderMap, name: &str) -> ApiResult<Option<String>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim().to_string()))
            .map_err(|_| ApiError::BadRequest(format!("header {name} is not valid UTF-8"))),
    }
}

fn parse_u64_header(headers: &HeaderMap, name: &str) -> ApiResult<Option<u64>> {
    match string_header(headers, name)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("header {name} is not a valid integer"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_headers_parse_strictly() {
        let mut headers = HeaderMap::new();
        headers.insert(UPLOAD_OFFSET, "42".parse().unwrap());
        assert_eq!(parse_u64_header(&headers, UPLOAD_OFFSET).unwrap(), Some(42));
        assert_eq!(parse_u64_header(&headers, UPLOAD_LENGTH).unwrap(), None);

        headers.insert(UPLOAD_LENGTH, "-1".parse().unwrap());
        assert!(parse_u64_header(&headers, UPLOAD_LENGTH).is_err());
    }

    #[test]
    fn upload_ids_reject_garbage() {
        assert!(parse_upload_id("definitely-not-a-uuid").is_err());
        let id = UploadId::new();
        assert_eq!(parse_upload_id(&id.to_string()).unwrap(), id);
    }
}
