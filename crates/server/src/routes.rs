//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (intentionally unauthenticated for load balancers/probes)
        .route("/health", get(handlers::health))
        // Upload endpoints
        .route("/api/upload/process", post(handlers::upload_process))
        .route(
            "/api/upload/patch",
            patch(handlers::upload_patch).head(handlers::upload_head),
        )
        .route(
            "/api/upload/revert",
            post(handlers::upload_revert).delete(handlers::upload_revert),
        )
        // File protection management
        .route("/api/v1/protect", post(handlers::protect_file))
        .route("/api/v1/unprotect", post(handlers::unprotect_file))
        .route("/api/v1/list", post(handlers::list_files))
        // Download endpoints (token-gated, no basic auth)
        .route("/download", get(handlers::download))
        .route("/preview", get(handlers::preview))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
