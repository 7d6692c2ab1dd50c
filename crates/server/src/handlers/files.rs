//! File protection management and listing.

use crate::access;
use crate::error::{ApiError, ApiResult};
use crate::handlers::read_json;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Body of POST /api/v1/protect.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectRequest {
    pub file_name: String,
    pub tokens: Vec<String>,
    /// Replace the file's accepted tokens instead of merging into them.
    #[serde(default)]
    pub replace: bool,
}

/// Body of POST /api/v1/unprotect.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnprotectRequest {
    pub file_name: String,
    /// Tokens to revoke. Omitted means the whole protection rule goes.
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
}

/// POST /api/v1/protect
///
/// Attach download tokens to a stored file. By default new tokens merge
/// with the existing set; `replace: true` swaps the set wholesale.
pub async fn protect_file(
    State(state): State<AppState>,
    req: Request<Body>,
) -> ApiResult<StatusCode> {
    access::authorize_api(&state, &req)?;
    let body: ProtectRequest = read_json(req).await?;
    ensure_stored_file(&state, &body.file_name).await?;

    let incoming: HashSet<String> = body.tokens.into_iter().collect();
    let tokens = if body.replace {
        incoming
    } else {
        match state.file_tokens.get_tokens(&body.file_name) {
            Some(mut existing) => {
                existing.extend(incoming);
                existing
            }
            None => incoming,
        }
    };
    state.file_tokens.put_tokens(&body.file_name, &tokens);
    state.file_tokens.save()?;
    tracing::info!(file = %body.file_name, tokens = tokens.len(), "updated protection rule");
    Ok(StatusCode::OK)
}

/// POST /api/v1/unprotect
///
/// Revoke tokens from a file. Revoking the last token, or omitting the
/// token list entirely, drops the rule and the file becomes public again.
pub async fn unprotect_file(
    State(state): State<AppState>,
    req: Request<Body>,
) -> ApiResult<StatusCode> {
    access::authorize_api(&state, &req)?;
    let body: UnprotectRequest = read_json(req).await?;
    ensure_stored_file(&state, &body.file_name).await?;

    match body.tokens {
        None => {
            state.file_tokens.remove(&body.file_name);
            tracing::info!(file = %body.file_name, "removed protection rule");
        }
        Some(revoked) => {
            if let Some(mut tokens) = state.file_tokens.get_tokens(&body.file_name) {
                for token in &revoked {
                    tokens.remove(token);
                }
                if tokens.is_empty() {
                    state.file_tokens.remove(&body.file_name);
                    tracing::info!(file = %body.file_name, "last token revoked, file is public");
                } else {
                    state.file_tokens.put_tokens(&body.file_name, &tokens);
                }
            }
        }
    }
    state.file_tokens.save()?;
    Ok(StatusCode::OK)
}

/// POST /api/v1/list
///
/// Inventory of stored files keyed by name, with size, creation time and
/// whether a download token is required.
pub async fn list_files(
    State(state): State<AppState>,
    req: Request<Body>,
) -> ApiResult<Json<Value>> {
    access::authorize_api(&state, &req)?;

    let mut entries = Map::new();
    let mut dir = tokio::fs::read_dir(&state.config.server.files_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let created = metadata
            .created()
            .ok()
            .map(OffsetDateTime::from)
            .and_then(|t| t.format(&Rfc3339).ok());
        entries.insert(
            name.clone(),
            json!({
                "creation": created,
                "size": metadata.len(),
                "formattedSize": format_size(metadata.len()),
                "requires-token": state.file_tokens.contains_key(&name),
            }),
        );
    }
    Ok(Json(Value::Object(entries)))
}

/// The management API only operates on files that are actually stored.
async fn ensure_stored_file(state: &AppState, name: &str) -> ApiResult<()> {
    let path = access::resolve_file_name(state, name)?;
    if !access::is_stored_file(&path).await {
        return Err(ApiError::BadRequest(
            "the target file does not exist".into(),
        ));
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
