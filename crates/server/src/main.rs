//! Shelf server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use shelf_core::config::AppConfig;
use shelf_server::{AppState, create_router};
use shelf_tokens::TokenStore;
use shelf_uploads::{SessionCache, Sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shelf - a token-protected file server with resumable uploads
#[derive(Parser, Debug)]
#[command(name = "shelfd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SHELF_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Shelf v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}, using defaults", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SHELF_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Ensure the files and scratch directories exist
    tokio::fs::create_dir_all(&config.server.files_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create files directory {}",
                config.server.files_dir.display()
            )
        })?;
    if let Some(scratch_dir) = &config.server.scratch_dir {
        tokio::fs::create_dir_all(scratch_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create scratch directory {}",
                    scratch_dir.display()
                )
            })?;
    }

    // Load token documents
    let file_tokens = TokenStore::load(&config.tokens.file_tokens)
        .context("failed to load file token document")?;
    let users = TokenStore::load(&config.tokens.users).context("failed to load users document")?;
    if users.keys().is_empty() {
        tracing::warn!(
            path = %config.tokens.users.display(),
            "users document is empty, every credentialed endpoint will reject requests"
        );
    }
    if config.tokens.watch {
        file_tokens
            .watch()
            .context("failed to watch file token document")?;
        users.watch().context("failed to watch users document")?;
        tracing::info!("Token document watchers registered");
    }

    // Upload engine: deletion worker and session cache
    let (sweeper, _sweeper_handle) = Sweeper::spawn(config.upload.delete_queue_depth);
    let sessions = Arc::new(SessionCache::new(
        config.upload.session_idle(),
        sweeper.clone(),
    ));
    let _sweep_handle =
        shelf_uploads::cache::spawn_sweep_task(sessions.clone(), config.upload.sweep_interval());

    // Create application state
    let state = AppState::new(config, file_tokens, users, sessions, sweeper);

    // Spawn rate limiter cleanup task if rate limiting is enabled
    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        shelf_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    // Parse bind address
    let addr: SocketAddr = state
        .config
        .server
        .bind
        .parse()
        .context("invalid bind address")?;

    // Create router
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    // Start server with ConnectInfo for client IP extraction
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
