//! Fixed-window rate limiting keyed by client identity
//!
//! Each client gets a counter that starts with its first request and resets
//! once the window has elapsed. Requests past the ceiling are answered with
//! 429 until the window ends. Counters for the same key are updated under the
//! map's per-entry lock, so concurrent requests never lose an increment.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::AppError;

/// Message sent with every rejected request.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Key used when the client address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the client's window ends
    pub reset_after: Duration,
}

impl Decision {
    /// Whole seconds until reset, rounded up
    pub fn reset_secs(&self) -> u64 {
        self.reset_after.as_secs() + u64::from(self.reset_after.subsec_nanos() > 0)
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATE_LIMIT_RESET, HeaderValue::from(self.reset_secs()));
        if !self.allowed {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(self.reset_secs()));
        }
    }
}

/// Per-client request counters
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: DashMap<String, Window>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `key` at the current time
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        // Must run before taking the entry lock below; retain locks every shard.
        self.maybe_sweep(now);

        let mut entry = self.clients.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        entry.count = entry.count.saturating_add(1);

        Decision {
            allowed: entry.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self
                .window
                .saturating_sub(now.duration_since(entry.started)),
        }
    }

    /// Number of clients currently holding a counter
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Drop every counter whose window has ended. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, window| now.duration_since(window.started) < self.window);
        before.saturating_sub(self.clients.len())
    }

    /// Sweep at most once per window, skipping if another request is already sweeping
    fn maybe_sweep(&self, now: Instant) {
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last_sweep) < self.window {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);

        let removed = self.sweep(now);
        if removed > 0 {
            tracing::debug!(removed, "Released expired rate-limit windows");
        }
    }
}

/// State handed to [`enforce`]
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub trust_proxy: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, trust_proxy: bool) -> Self {
        Self {
            limiter,
            trust_proxy,
        }
    }
}

/// Identify the client: the peer address, or the left-most forwarded address
/// when the deployment sits behind a trusted proxy.
pub fn client_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Count the request and reject it once the client is over its ceiling
pub async fn enforce(State(state): State<RateLimitState>, request: Request, next: Next) -> Response {
    let key = client_key(&request, state.trust_proxy);
    let decision = state.limiter.check(&key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, retry_after = decision.reset_secs(), "Rate limit exceeded");
        AppError::too_many_requests(RATE_LIMIT_MESSAGE).into_response()
    };

    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_ceiling_is_enforced() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        let decisions: Vec<_> = (0..4).map(|_| limiter.check_at("1.2.3.4", now)).collect();

        assert!(decisions[..3].iter().all(|d| d.allowed));
        assert!(!decisions[3].allowed);
        assert_eq!(decisions[0].remaining, 2);
        assert_eq!(decisions[2].remaining, 0);
        assert_eq!(decisions[3].remaining, 0);
    }

    #[test]
    fn test_window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).allowed);
        assert!(!limiter.check_at("a", start + Duration::from_secs(59)).allowed);
        assert!(limiter.check_at("a", start + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
    }

    #[test]
    fn test_reset_is_reported_in_whole_seconds() {
        let limiter = RateLimiter::new(5, Duration::from_secs(900));
        let start = Instant::now();

        limiter.check_at("a", start);
        let decision = limiter.check_at("a", start + Duration::from_millis(1500));

        assert_eq!(decision.reset_after, Duration::from_millis(898_500));
        assert_eq!(decision.reset_secs(), 899);
    }

    #[test]
    fn test_expired_windows_are_swept() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();

        limiter.check_at("a", start);
        limiter.check_at("b", start + Duration::from_secs(30));
        assert_eq!(limiter.tracked_clients(), 2);

        assert_eq!(limiter.sweep(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_stale_keys_are_released_on_access() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..50 {
            limiter.check_at(&format!("10.0.0.{i}"), start);
        }
        assert_eq!(limiter.tracked_clients(), 50);

        limiter.check_at("10.0.1.1", start + Duration::from_secs(120));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let limiter = RateLimiter::new(100, Duration::from_secs(900));
        let now = Instant::now();

        let allowed: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..50)
                            .filter(|_| limiter.check_at("shared", now).allowed)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(allowed, 100);
        let last = limiter.check_at("shared", now);
        assert!(!last.allowed);
    }

    #[test]
    fn test_client_key_prefers_peer_address() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 40000))));

        assert_eq!(client_key(&request, false), "192.0.2.1");
        assert_eq!(client_key(&request, true), "203.0.113.9");
    }

    #[test]
    fn test_client_key_uses_left_most_forwarded_address() {
        let mut request = Request::new(Body::empty());
        request.headers_mut().insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static(" 198.51.100.7 , 10.0.0.1"),
        );

        assert_eq!(client_key(&request, true), "198.51.100.7");
        assert_eq!(client_key(&request, false), UNKNOWN_CLIENT);
    }
}
