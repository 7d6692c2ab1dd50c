//! Application state shared across handlers.

use crate::ratelimit::RateLimitState;
use shelf_core::config::AppConfig;
use shelf_tokens::TokenStore;
use shelf_uploads::{SessionCache, Sweeper};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Root directory upload scratch space lives under.
    pub scratch_root: PathBuf,
    /// Open upload sessions.
    pub sessions: Arc<SessionCache>,
    /// File name to download token document.
    pub file_tokens: TokenStore,
    /// API username to password document.
    pub users: TokenStore,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
    /// Background scratch deletion queue.
    pub sweeper: Sweeper,
}

impl AppState {
    /// Create a new application state.
    ///
    /// This performs configuration validation and logs warnings for
    /// suspect settings.
    ///
    /// # Panics
    ///
    /// Panics if rate limit or upload configuration validation fails.
    pub fn new(
        config: AppConfig,
        file_tokens: TokenStore,
        users: TokenStore,
        sessions: Arc<SessionCache>,
        sweeper: Sweeper,
    ) -> Self {
        match config.rate_limit.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("configuration warning: {}", warning);
                }
            }
            Err(error) => {
                panic!("invalid rate limit configuration: {}", error);
            }
        }
        if let Err(error) = config.upload.validate() {
            panic!("invalid upload configuration: {}", error);
        }

        let rate_limit = RateLimitState::new(&config.rate_limit);
        let scratch_root = config
            .server
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        Self {
            config: Arc::new(config),
            scratch_root,
            sessions,
            file_tokens,
            users,
            rate_limit,
            sweeper,
        }
    }

    /// Get the cleanup interval for the rate limiter, if enabled.
    /// Returns a default of 60 seconds if the interval is configured as
    /// zero (to prevent tokio::time::interval from panicking).
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if self.rate_limit.is_enabled() {
            let interval_secs = self.config.rate_limit.cleanup_interval_secs;
            if interval_secs == 0 {
                tracing::warn!("rate_limit.cleanup_interval_secs is 0, using default of 60 seconds");
                Some(Duration::from_secs(60))
            } else {
                Some(Duration::from_secs(interval_secs))
            }
        } else {
            None
        }
    }
}
