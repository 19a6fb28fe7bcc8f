//! Per-client rate limiting for state-changing requests
//!
//! Counters live in process memory behind a mutex. The cap therefore holds
//! per server process and resets on restart; a multi-process deployment
//! needs a shared store behind the same interface to keep the guarantee.

use crate::config::RateLimitConfig;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One tracked client
#[derive(Debug, Clone, Copy)]
struct Attempt {
    count: u32,
    last_attempt: Instant,
}

/// Sliding-window request counter keyed by client address.
///
/// Injected into the request pipeline through application state rather than
/// living as a process global, so tests can construct their own and a shared
/// store can replace it later.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_attempts: u32,
    window: Duration,
    attempts: Mutex<HashMap<String, Attempt>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        RateLimiter {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            window: Duration::from_secs(config.window_secs),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `key`. Returns `false` when the client is over
    /// its cap and the request must be rejected.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut attempts = self.attempts.lock().unwrap();

        // Lazy garbage collection: drop clients idle for a full window.
        // O(n) per request, acceptable at this scale.
        let window = self.window;
        attempts.retain(|_, a| now.duration_since(a.last_attempt) < window);

        match attempts.get_mut(key) {
            Some(entry) => {
                let elapsed = now.duration_since(entry.last_attempt);
                if elapsed >= self.window {
                    entry.count = 1;
                    entry.last_attempt = now;
                    true
                } else if entry.count >= self.max_attempts {
                    // Rejections do not refresh the window; it is measured
                    // from the last accepted attempt
                    false
                } else {
                    entry.count += 1;
                    entry.last_attempt = now;
                    true
                }
            }
            None => {
                attempts.insert(
                    key.to_string(),
                    Attempt {
                        count: 1,
                        last_attempt: now,
                    },
                );
                true
            }
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

/// Derive the rate-limit bucket key for a request: the first entry of
/// X-Forwarded-For when present, else the peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_state_changing(method: &Method) -> bool {
    *method == Method::POST
        || *method == Method::PUT
        || *method == Method::PATCH
        || *method == Method::DELETE
}

/// Middleware applying the limiter to state-changing requests. Reads and
/// GETs pass through untouched.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_state_changing(request.method()) {
        let key = client_key(request.headers(), peer.map(|ConnectInfo(addr)| addr));
        if !limiter.check(&key) {
            tracing::warn!(client = %key, "rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts. Try again later.",
            )
                .into_response();
        }
    }

    next.run(request).await
}
