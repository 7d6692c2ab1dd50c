//! Download and preview streaming.

use crate::access;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::header;
use axum::response::Response;
use serde::Deserialize;
use std::path::Path;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Query parameters shared by download and preview.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
    pub token: Option<String>,
}

/// GET /download?fileName=...&token=...
///
/// Streams the file as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    req: Request<Body>,
) -> ApiResult<Response> {
    let path = access::authorize_download(
        &state,
        &req,
        query.file_name.as_deref(),
        query.token.as_deref(),
    )
    .await?;
    stream_file(&path, Disposition::Attachment).await
}

/// GET /preview?fileName=...&token=...
///
/// Same gate as download, but served inline with a guessed content type
/// so browsers render it instead of saving it.
pub async fn preview(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    req: Request<Body>,
) -> ApiResult<Response> {
    let path = access::authorize_download(
        &state,
        &req,
        query.file_name.as_deref(),
        query.token.as_deref(),
    )
    .await?;
    stream_file(&path, Disposition::Inline).await
}

enum Disposition {
    Attachment,
    Inline,
}

async fn stream_file(path: &Path, disposition: Disposition) -> ApiResult<Response> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (content_type, disposition) = match disposition {
        Disposition::Attachment => (
            "application/octet-stream".to_string(),
            format!("attachment; filename=\"{name}\""),
        ),
        Disposition::Inline => (
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string(),
            format!("inline; filename=\"{name}\""),
        ),
    };

    tracing::info!(file = %name, bytes = len, "streaming file");
    let body = Body::from_stream(ReaderStream::new(file));
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}
