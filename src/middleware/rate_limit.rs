//! Fixed-window request limiting keyed by caller.
//!
//! Counters live in process memory, so limits apply per instance.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::auth::{client_address, extract_token};
use crate::app::AppState;
use crate::error::ApiError;

struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_after: Duration,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        windows.retain(|_, window| window.reset_at > now);

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.window,
        });
        let reset_after = window.reset_at.saturating_duration_since(now);

        if window.count >= self.max_requests {
            return RateDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_after,
        }
    }

    /// Number of live windows, for diagnostics
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().map(|windows| windows.len()).unwrap_or(0)
    }
}

/// ISO-8601 instant at which a window ending `after` from `now` resets
fn reset_timestamp(now: DateTime<Utc>, after: Duration) -> String {
    let after = chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::zero());
    (now + after).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn insert_reset(headers: &mut HeaderMap, decision: &RateDecision) {
    if let Ok(value) = HeaderValue::try_from(reset_timestamp(Utc::now(), decision.reset_after)) {
        headers.insert("X-RateLimit-Reset", value);
    }
}

/// Rate-limit key: the token subject when a token decodes, else the
/// forwarded client address
fn client_key(state: &AppState, headers: &HeaderMap, query: Option<&str>) -> String {
    extract_token(headers, query)
        .and_then(|token| state.jwt.peek_subject(&token))
        .map(|sub| format!("user:{}", sub))
        .unwrap_or_else(|| format!("ip:{}", client_address(headers)))
}

pub async fn rate_limit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limiter = state.rate_limiter.clone();
    enforce(&state, &limiter, request, next).await
}

/// Stricter limit applied to document uploads
pub async fn upload_rate_limit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limiter = state.upload_limiter.clone();
    enforce(&state, &limiter, request, next).await
}

async fn enforce(state: &AppState, limiter: &RateLimiter, request: Request, next: Next) -> Response {
    let key = client_key(state, request.headers(), request.uri().query());
    let decision = limiter.check(&key);

    if !decision.allowed {
        tracing::warn!("Rate limit exceeded for {}", key);
        let mut response = ApiError::too_many_requests("Rate limit exceeded").into_response();
        let headers = response.headers_mut();
        headers.insert("Retry-After", HeaderValue::from(decision.reset_after.as_secs().max(1)));
        headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
        insert_reset(headers, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    insert_reset(headers, &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert_eq!(limiter.check_at("ip:1", now).remaining, 2);
        assert_eq!(limiter.check_at("ip:1", now).remaining, 1);
        assert_eq!(limiter.check_at("ip:1", now).remaining, 0);

        let blocked = limiter.check_at("ip:1", now);
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert_eq!(blocked.reset_after, Duration::from_secs(60));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("ip:1", now).allowed);
        assert!(limiter.check_at("ip:2", now).allowed);
        assert!(!limiter.check_at("ip:1", now).allowed);
    }

    #[test]
    fn window_resets_and_expired_entries_are_purged() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at("ip:1", start).allowed);
        assert!(limiter.check_at("ip:2", start).allowed);
        assert!(!limiter.check_at("ip:1", start + Duration::from_secs(5)).allowed);

        let later = start + Duration::from_secs(11);
        assert!(limiter.check_at("ip:1", later).allowed);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn reset_is_an_iso_timestamp() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(reset_timestamp(now, Duration::from_secs(90)), "2026-03-01T10:01:30Z");
    }

    #[tokio::test]
    async fn blocked_requests_carry_reset_headers() {
        use crate::config::AppConfig;
        use crate::testing::{request, TestApp};
        use axum::http::{Method, StatusCode};

        let mut config = AppConfig::for_tests();
        config.api.enable_rate_limiting = true;
        config.api.rate_limit_requests = 1;
        let app = TestApp::with_config(config);

        let (status, headers, _) = app.call(request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-ratelimit-remaining"], "0");

        let before = Utc::now();
        let (status, headers, body) = app.call(request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(headers["x-ratelimit-limit"], "1");
        assert!(headers["retry-after"].to_str().unwrap().parse::<u64>().unwrap() > 0);

        let reset = headers["x-ratelimit-reset"].to_str().unwrap();
        let reset = DateTime::parse_from_rfc3339(reset).unwrap().with_timezone(&Utc);
        assert!(reset > before);
        assert!(reset <= before + chrono::Duration::minutes(16));
    }
}
