//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory served files live in. Created on startup if missing.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    /// Directory upload session scratch space is allocated under.
    /// Defaults to the system temp directory when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("./data/files")
}

fn default_max_body_bytes() -> usize {
    128 * 1024 * 1024 // 128 MiB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            files_dir: default_files_dir(),
            scratch_dir: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upload session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Seconds a session may sit idle before it is evicted.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    /// Interval in seconds between sweeps of idle sessions.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Capacity of the background scratch deletion queue.
    /// When full, further deletion requests are dropped with a warning.
    #[serde(default = "default_delete_queue_depth")]
    pub delete_queue_depth: usize,
}

fn default_session_idle_secs() -> u64 {
    7200 // 2 hours
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_delete_queue_depth() -> usize {
    64
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            session_idle_secs: default_session_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            delete_queue_depth: default_delete_queue_depth(),
        }
    }
}

impl UploadConfig {
    /// Get the session idle timeout as a Duration.
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Get the sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_secs == 0 {
            return Err("upload.sweep_interval_secs cannot be 0. \
                 This would cause a panic when creating the sweep timer. \
                 Use a value >= 1 second."
                .to_string());
        }
        Ok(())
    }
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests allowed per client within one window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds. A window starts at a client's first
    /// request and is not extended by later requests.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Interval in seconds between cleanup sweeps of expired windows.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_max_requests() -> u32 {
    1000
}

fn default_window_secs() -> u64 {
    600 // 10 minutes
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Get the window length as a Duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Validate rate limit configuration for dangerous settings.
    /// Returns warnings for configs that are suspect but allowed,
    /// and errors for configs that are unsafe and should be rejected.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.window_secs == 0 {
            return Err("rate_limit.window_secs cannot be 0. \
                 Every request would start a fresh window and the limit would never apply. \
                 Use a value >= 1 second."
                .to_string());
        }

        if self.max_requests == 0 {
            return Err(
                "rate_limit.max_requests cannot be 0. This would reject every request. \
                 Disable rate limiting instead via rate_limit.enabled = false."
                    .to_string(),
            );
        }

        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0. \
                 This would cause a panic when creating the cleanup timer. \
                 Use a value >= 1 second."
                .to_string());
        }

        if self.max_requests > 1_000_000 {
            warnings.push(format!(
                "rate_limit.max_requests={} is effectively unlimited. \
                 Consider disabling rate limiting instead.",
                self.max_requests
            ));
        }

        if self.window_secs > 86400 {
            warnings.push(format!(
                "rate_limit.window_secs={} exceeds one day. Clients that hit the \
                 ceiling stay blocked for the whole window.",
                self.window_secs
            ));
        }

        Ok(warnings)
    }
}

/// Token document configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokensConfig {
    /// Path to the JSON document mapping file names to download tokens.
    #[serde(default = "default_file_tokens_path")]
    pub file_tokens: PathBuf,
    /// Path to the JSON document mapping API usernames to passwords.
    #[serde(default = "default_users_path")]
    pub users: PathBuf,
    /// Watch the documents for external edits and reload them.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_file_tokens_path() -> PathBuf {
    PathBuf::from("./config/tokens.json")
}

fn default_users_path() -> PathBuf {
    PathBuf::from("./config/users.json")
}

fn default_watch() -> bool {
    true
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            file_tokens: default_file_tokens_path(),
            users: default_users_path(),
            watch: default_watch(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload session configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Token document configuration.
    #[serde(default)]
    pub tokens: TokensConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Rate limiting and document watching are
    /// disabled; directory paths are expected to be overridden with
    /// temporary locations.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            upload: UploadConfig::default(),
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            tokens: TokensConfig {
                watch: false,
                ..TokensConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_requests, 1000);
        assert_eq!(config.window_secs, 600);
    }

    #[test]
    fn test_rate_limit_validate_rejects_zero_window() {
        let config = RateLimitConfig {
            window_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_validate_rejects_zero_max_requests() {
        let config = RateLimitConfig {
            max_requests: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_validate_skipped_when_disabled() {
        let config = RateLimitConfig {
            enabled: false,
            max_requests: 0,
            window_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_rate_limit_validate_warns_on_huge_ceiling() {
        let config = RateLimitConfig {
            max_requests: 2_000_000,
            ..RateLimitConfig::default()
        };
        assert!(!config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_upload_config_deserialize_defaults() {
        let json = r#"{}"#;
        let config: UploadConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session_idle_secs, 7200);
        assert_eq!(config.delete_queue_depth, 64);
    }

    #[test]
    fn test_upload_validate_rejects_zero_sweep_interval() {
        let config = UploadConfig {
            sweep_interval_secs: 0,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
