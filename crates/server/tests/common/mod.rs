//! Server test utilities.

use axum::Router;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use shelf_core::config::AppConfig;
use shelf_server::{AppState, create_router};
use shelf_tokens::TokenStore;
use shelf_uploads::{SessionCache, Sweeper};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_USER: &str = "admin";
pub const TEST_PASSWORD: &str = "test-password";

const BOUNDARY: &str = "shelf-test-boundary";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with temporary directories and one API user.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let files_dir = temp_dir.path().join("files");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&files_dir).expect("Failed to create files directory");
        std::fs::create_dir_all(&scratch_dir).expect("Failed to create scratch directory");

        let mut config = AppConfig::for_testing();
        config.server.files_dir = files_dir;
        config.server.scratch_dir = Some(scratch_dir);
        config.tokens.file_tokens = temp_dir.path().join("tokens.json");
        config.tokens.users = temp_dir.path().join("users.json");
        modifier(&mut config);

        let file_tokens =
            TokenStore::load(&config.tokens.file_tokens).expect("Failed to load token document");
        let users = TokenStore::load(&config.tokens.users).expect("Failed to load users document");
        users.put_str(TEST_USER, TEST_PASSWORD);
        users.save().expect("Failed to save users document");

        let (sweeper, _handle) = Sweeper::spawn(config.upload.delete_queue_depth);
        let sessions = Arc::new(SessionCache::new(
            config.upload.session_idle(),
            sweeper.clone(),
        ));
        let state = AppState::new(config, file_tokens, users, sessions, sweeper);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// The directory served files live in.
    pub fn files_dir(&self) -> &Path {
        &self.state.config.server.files_dir
    }

    /// Drop a file directly into the files directory.
    pub fn write_file(&self, name: &str, data: &[u8]) {
        std::fs::write(self.files_dir().join(name), data).expect("Failed to write test file");
    }
}

/// Authorization header value for the test user.
#[allow(dead_code)]
pub fn basic_auth() -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{TEST_USER}:{TEST_PASSWORD}"))
    )
}

/// Authorization header value for arbitrary credentials.
#[allow(dead_code)]
pub fn basic_auth_for(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

/// A multipart body carrying one file part.
#[allow(dead_code)]
pub fn multipart_file(file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// A multipart file body cut off mid-stream: the data ends without a
/// terminating boundary, so reading the part fails partway through.
#[allow(dead_code)]
pub fn multipart_file_truncated(file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// A multipart body with no file part, which opens a chunked session.
#[allow(dead_code)]
pub fn multipart_empty() -> (String, Vec<u8>) {
    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        format!("--{BOUNDARY}--\r\n").into_bytes(),
    )
}
