//! Per-identity rate limiting for queue mutations
//!
//! A participant hammering join/leave (or a misbehaving bot relaying for
//! them) gets throttled per action without affecting anyone else.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Rate limiter state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of action:identity to (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    /// Maximum requests per window
    max_requests: u32,
    /// Time window duration
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10)) // 5 requests per 10 seconds
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check if a request should be allowed
    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                // Check if we're in a new window
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Check one action for one participant
    pub async fn check_identity(&self, action: &str, identity: &str) -> bool {
        self.check(&rate_limit_key(action, identity)).await
    }

    /// Clean up old entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Case-folded so "Alice" and "alice" share a budget
fn rate_limit_key(action: &str, identity: &str) -> String {
    format!("{}:{}", action, identity.trim().to_lowercase())
}

/// Anti-abuse configuration
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    /// Rate limiter (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

impl AbuseConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let rate_limit_enabled = std::env::var("RATE_LIMIT")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let rate_limiter = if rate_limit_enabled {
            let max_requests = std::env::var("RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);

            let window_secs = std::env::var("RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);

            Some(RateLimiter::new(
                max_requests,
                Duration::from_secs(window_secs),
            ))
        } else {
            None
        };

        tracing::info!(rate_limit_enabled, "Anti-abuse config loaded");

        Self { rate_limiter }
    }
}

/// Spawn a background task that periodically drops expired limiter windows
pub fn spawn_cleanup(limiter: RateLimiter) {
    tokio::spawn(async move {
        let every = limiter.window().max(Duration::from_secs(1));
        loop {
            tokio::time::sleep(every).await;
            limiter.cleanup().await;
            let keys = limiter.tracked_keys().await;
            tracing::trace!(keys, "Rate limiter cleaned up");
        }
    });
}
