//! Per-client fixed-window rate limiting.
//!
//! Every gated request counts against a window keyed by client address.
//! A window starts at the client's first request and is never extended by
//! later requests: once the ceiling is hit the client stays blocked until
//! the original window elapses, and the reported wait time shrinks as the
//! window ages. The first request after expiry starts a fresh window.
//!
//! Expired windows are also evicted by a background cleanup task so the
//! map does not grow with one entry per client forever.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use dashmap::{DashMap, mapref::entry::Entry};
use shelf_core::config::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

/// Inner state that's only allocated when rate limiting is enabled.
struct RateLimitStateInner {
    /// Per-client request windows.
    windows: DashMap<String, Window>,
    /// Requests allowed per window.
    max_requests: u32,
    /// Window length.
    window: Duration,
    /// Whether the ConnectInfo missing warning has been logged.
    connect_info_warned: AtomicBool,
}

/// One client's request window.
#[derive(Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Error returned when the rate limit is exceeded.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the client's window expires.
    pub retry_after_secs: u64,
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }
        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                windows: DashMap::new(),
                max_requests: config.max_requests,
                window: config.window(),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Count one request for `key` and decide whether it may proceed.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return Ok(()),
        };

        let now = Instant::now();
        match inner.windows.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                let age = now.duration_since(window.started);
                if age >= inner.window {
                    *window = Window {
                        count: 1,
                        started: now,
                    };
                    Ok(())
                } else if window.count >= inner.max_requests {
                    let remaining = inner.window - age;
                    Err(RateLimitError {
                        retry_after_secs: remaining.as_millis().div_ceil(1000) as u64,
                    })
                } else {
                    window.count += 1;
                    Ok(())
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Window {
                    count: 1,
                    started: now,
                });
                Ok(())
            }
        }
    }

    /// Evict expired windows. Returns the number evicted.
    ///
    /// Uses `remove_if` so a window that restarted between collection and
    /// removal survives.
    pub fn cleanup(&self) -> usize {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return 0,
        };

        let now = Instant::now();
        let expired: Vec<String> = inner
            .windows
            .iter()
            .filter(|entry| now.duration_since(entry.value().started) >= inner.window)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            if inner
                .windows
                .remove_if(&key, |_, window| {
                    now.duration_since(window.started) >= inner.window
                })
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = inner.windows.len(),
                "rate limiter cleanup completed"
            );
        }
        evicted
    }

    /// Number of tracked client windows.
    pub fn entry_count(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.windows.len(),
            None => 0,
        }
    }

    /// Extract the limiter key for a request: the peer IP from ConnectInfo.
    ///
    /// Without ConnectInfo every request shares one bucket; that is warned
    /// about once since it usually means the server was started without
    /// `into_make_service_with_connect_info`.
    pub fn client_key(&self, req: &Request<Body>) -> String {
        match req.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ci) => ci.0.ip().to_string(),
            None => {
                self.warn_connect_info_missing();
                "unknown".to_string()
            }
        }
    }

    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting. All requests will share a \
                 single rate limit window ('unknown' client). Add \
                 .into_make_service_with_connect_info::<SocketAddr>() to your server \
                 configuration to enable per-client limiting."
            );
        }
    }
}

/// Spawn a background task that periodically evicts expired windows.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(evicted, "rate limiter cleanup evicted expired windows");
            }
        }
    })
}
