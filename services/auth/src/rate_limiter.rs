//! Failed-attempt throttling for credential endpoints

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failures tolerated inside one window
    pub max_failures: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// How long a key stays blocked once it runs out of attempts
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_failures: 10,
            window_seconds: 300,
            ban_duration_seconds: 900,
        }
    }
}

#[derive(Debug)]
struct Failures {
    count: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

impl Failures {
    /// Still blocked, or still counting inside its window
    fn is_live(&self, now: Instant, window: Duration) -> bool {
        match self.blocked_until {
            Some(until) => now < until,
            None => now.duration_since(self.window_start) < window,
        }
    }
}

/// Counts failed attempts per client key in process memory
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, Failures>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` has spent its failure budget
    pub async fn is_blocked(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let Some(entry) = entries.get_mut(key) else {
            return false;
        };

        match entry.blocked_until {
            Some(until) if now < until => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Count a failed attempt; blocks the key once the budget is spent
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        entries.retain(|_, entry| entry.is_live(now, window));

        let entry = entries.entry(key.to_string()).or_insert(Failures {
            count: 0,
            window_start: now,
            blocked_until: None,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count >= self.config.max_failures && entry.blocked_until.is_none() {
            entry.blocked_until =
                Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            warn!(
                "Blocked client {} for {} seconds after {} failures",
                key, self.config.ban_duration_seconds, entry.count
            );
        }
    }

    /// Forget the failures of `key` after a successful attempt
    pub async fn clear(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.blocked_until.is_none())
        {
            entries.remove(key);
        }
    }
}

/// Client key for throttling: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, else `anonymous`
pub fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or("anonymous")
        .to_string()
}
