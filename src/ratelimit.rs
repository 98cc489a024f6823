//! # Rate Limit
//! Per-client sliding window (default 60 requests per 60s).
//!
//! Each client keeps a queue of request instants; entries older than the
//! window are dropped on every check.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

/// Thread-safe sliding-window limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<HashMap<String, VecDeque<Instant>>>,
    window: Duration,
    max_requests: usize,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            window,
            max_requests: max_requests.max(1),
        }
    }

    /// Convenience constructor for a one-minute window.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record a request from `client` if it fits in the window.
    /// Returns `false` (and records nothing) when the limit is reached.
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");

        // forget clients that went quiet
        inner.retain(|_, q| q.back().is_some_and(|t| now.duration_since(*t) < self.window));

        let buf = inner.entry(client.to_string()).or_default();
        while let Some(&t) = buf.front() {
            if now.duration_since(t) >= self.window {
                buf.pop_front();
            } else {
                break;
            }
        }

        if buf.len() >= self.max_requests {
            return false;
        }
        buf.push_back(now);
        true
    }
}
