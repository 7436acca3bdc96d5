//! Per-IP fixed-window rate limiting
//!
//! Each limiter keeps one counter per client IP. A window opens with the
//! first request and closes `window` later; requests over the budget
//! inside it are rejected with 429 and a `Retry-After` header.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderName, HeaderValue, header};
use tokio::time::Instant;

use super::public::ApiError;
use crate::core::{AppConfig, RateLimit};
use crate::error::ErrorKind;

// Stale windows are only pruned once the map grows past this
const PRUNE_THRESHOLD: usize = 1024;

static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    message: &'static str,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit, message: &'static str) -> Self {
        Self {
            limit,
            message,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Count a request from `key`. Returns the remaining budget, or how
    /// long until the window resets when the budget is spent.
    pub fn check(&self, key: &str) -> Result<u32, Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| w.reset_at > now);
        }

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.limit.window,
        });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.limit.window;
        }

        if window.count >= self.limit.max_requests {
            return Err(window.reset_at - now);
        }
        window.count += 1;
        Ok(self.limit.max_requests - window.count)
    }
}

/// The three budgets applied to the API.
#[derive(Clone, Debug)]
pub struct RateLimiters {
    pub general: Arc<RateLimiter>,
    pub creation: Arc<RateLimiter>,
    pub messages: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            general: Arc::new(RateLimiter::new(
                config.general_rate_limit,
                "Too many requests from this IP, please try again later",
            )),
            creation: Arc::new(RateLimiter::new(
                config.creation_rate_limit,
                "Too many accounts created from this IP, please try again later",
            )),
            messages: Arc::new(RateLimiter::new(
                config.message_rate_limit,
                "Too many message requests, please slow down",
            )),
        }
    }
}

/// Prefer the first `X-Forwarded-For` hop, then the peer address.
fn client_key(request: &Request) -> String {
    forwarded_for(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Middleware enforcing `limiter`. Use with
/// `axum::middleware::from_fn_with_state`.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let max = HeaderValue::from(limiter.limit.max_requests);

    match limiter.check(&key) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            // A narrower limiter further in has already reported its budget
            let headers = response.headers_mut();
            if !headers.contains_key(&X_RATELIMIT_LIMIT) {
                headers.insert(X_RATELIMIT_LIMIT.clone(), max);
                headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
            }
            response
        }
        Err(retry_after) => {
            tracing::warn!("Rate limit exceeded for {}: {}", key, limiter.message);
            let mut response =
                ApiError::new(ErrorKind::RateLimited, limiter.message).into_response();
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT.clone(), max);
            headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
            headers.insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            response
        }
    }
}
