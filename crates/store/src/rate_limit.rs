//! Fixed-window request limiter.
//!
//! Each caller key (e.g. client IP and route) gets a counter that starts
//! with its first request and resets once the window has passed. Counters
//! live in a `moka` cache whose entries expire with the window, and the
//! number of tracked keys is bounded, so memory stays flat under a flood of
//! distinct keys.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use moka::future::Cache;

use crate::config::RateLimitConfig;

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the window resets.
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: AtomicU32,
}

impl Window {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            count: AtomicU32::new(0),
        }
    }
}

/// Fixed-window rate limiter.
///
/// Cheap to clone; clones share the same counters.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Cache<String, Arc<Window>>,
    max_requests: u32,
    window: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("tracked_keys", &self.windows.entry_count())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let windows = Cache::builder()
            .max_capacity(config.max_keys)
            .time_to_live(config.window)
            .build();

        Self {
            windows,
            max_requests: config.max_requests,
            window: config.window,
        }
    }

    /// Count a request for `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let mut window = self
            .windows
            .get_with(key.to_owned(), async { Arc::new(Window::new()) })
            .await;

        // Cache expiry is lazy; never count against a window that has ended.
        if window.started.elapsed() >= self.window {
            window = Arc::new(Window::new());
            self.windows.insert(key.to_owned(), Arc::clone(&window)).await;
        }

        let used = window.count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let allowed = used <= self.max_requests;
        let retry_after = self.window.saturating_sub(window.started.elapsed());

        if !allowed {
            tracing::debug!(key, used, "Rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            remaining: self.max_requests.saturating_sub(used),
            retry_after,
        }
    }

    /// Forget the counter for `key`.
    pub async fn reset(&self, key: &str) {
        self.windows.invalidate(key).await;
    }
}
