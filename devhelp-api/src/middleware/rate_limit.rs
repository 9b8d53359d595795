/// Fixed-window rate limiting for the public auth endpoints
///
/// Each [`RateLimiter`] counts hits per key (client IP or email) inside a
/// fixed window and rejects with 429 `MANY_REQUESTS` once the budget is
/// spent. State lives in-process in a [`DashMap`].
///
/// # Limits
///
/// | Route | Key | Budget |
/// |---|---|---|
/// | GET /auth/validate-invite | IP | 50 / 1 h |
/// | POST /auth/forgot-password | IP | 10 / 15 min |
/// | POST /auth/forgot-password | email | 3 / 15 min |
/// | POST /auth/reset-password | IP | 20 / 15 min |
/// | POST /super-admin/login | IP | 5 / 15 min |
///
/// # Headers
///
/// - `RateLimit-Limit`: Requests allowed per window
/// - `RateLimit-Remaining`: Requests left in the current window
/// - `RateLimit-Reset`: Seconds until the window resets
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// # Example
///
/// ```
/// use devhelp_api::middleware::rate_limit::{RateLimiter, RatePolicy};
/// use std::time::Duration;
///
/// let limiter = RateLimiter::new(RatePolicy {
///     limit: 2,
///     window: Duration::from_secs(60),
///     message: "Too many requests.",
/// });
///
/// assert!(limiter.check("10.0.0.1").is_ok());
/// assert!(limiter.check("10.0.0.1").is_ok());
/// assert!(limiter.check("10.0.0.1").is_err());
/// assert!(limiter.check("10.0.0.2").is_ok());
/// ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use devhelp_shared::error::AppError;

use crate::error::ApiError;

/// Windows are swept once the table grows past this many keys
const SWEEP_THRESHOLD: usize = 10_000;

const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

pub const RATELIMIT_LIMIT: &str = "ratelimit-limit";
pub const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
pub const RATELIMIT_RESET: &str = "ratelimit-reset";

/// Budget for one limiter
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,

    /// Message of the 429 response
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Outcome of an allowed hit, rendered as `RateLimit-*` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

impl RateStatus {
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_after_secs));
    }
}

/// Fixed-window counter keyed by string
#[derive(Debug)]
pub struct RateLimiter {
    policy: RatePolicy,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    /// Records a hit for `key`
    ///
    /// # Errors
    ///
    /// `AppError::TooManyRequests` once the window budget is spent
    pub fn check(&self, key: &str) -> Result<RateStatus, AppError> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<RateStatus, AppError> {
        let RatePolicy { limit, window, message } = self.policy;

        if self.windows.len() > SWEEP_THRESHOLD {
            self.windows
                .retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });

        if now.saturating_duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }

        let elapsed = now.saturating_duration_since(entry.started);
        let reset_after_secs = window.saturating_sub(elapsed).as_secs().max(1);

        if entry.hits >= limit {
            tracing::warn!(key = %key, limit, "Rate limit exceeded");
            return Err(AppError::TooManyRequests {
                message: message.to_string(),
                retry_after_secs: reset_after_secs,
            });
        }

        entry.hits += 1;

        Ok(RateStatus {
            limit,
            remaining: limit - entry.hits,
            reset_after_secs,
        })
    }
}

/// The limiters the router wires in
#[derive(Debug, Clone)]
pub struct Limiters {
    pub validate_invite: Arc<RateLimiter>,
    pub forgot_password_ip: Arc<RateLimiter>,
    pub forgot_password_email: Arc<RateLimiter>,
    pub reset_password: Arc<RateLimiter>,
    pub super_admin_login: Arc<RateLimiter>,

    /// Whether `X-Forwarded-For` identifies the client
    pub trust_proxy: bool,
}

impl Limiters {
    pub fn new(trust_proxy: bool) -> Self {
        let limiter = |limit, window, message| {
            Arc::new(RateLimiter::new(RatePolicy {
                limit,
                window,
                message,
            }))
        };

        Self {
            validate_invite: limiter(
                50,
                Duration::from_secs(60 * 60),
                "Too many request. Please try again later.",
            ),
            forgot_password_ip: limiter(
                10,
                FIFTEEN_MINUTES,
                "Too many requests. Please try again later.",
            ),
            forgot_password_email: limiter(
                3,
                FIFTEEN_MINUTES,
                "Too many requests. Please try again in 15 minutes.",
            ),
            reset_password: limiter(
                20,
                FIFTEEN_MINUTES,
                "Too many attempts. Please try again later.",
            ),
            super_admin_login: limiter(
                5,
                FIFTEEN_MINUTES,
                "Too many attempts. Please try again in 15 minutes",
            ),
            trust_proxy,
        }
    }
}

/// Client identity for IP-keyed limits
///
/// First `X-Forwarded-For` entry when proxies are trusted, else the socket
/// address, else `"unknown"`.
pub fn client_ip(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// State for [`limit_by_ip`]
#[derive(Debug, Clone)]
pub struct IpLimit {
    pub limiter: Arc<RateLimiter>,
    pub trust_proxy: bool,
}

/// Middleware applying an IP-keyed limiter
pub async fn limit_by_ip(State(limit): State<IpLimit>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request, limit.trust_proxy);
    let policy = limit.limiter.policy();

    match limit.limiter.check(&ip) {
        Ok(status) => {
            let mut response = next.run(request).await;
            status.apply(response.headers_mut());
            response
        }
        Err(err) => {
            let retry_after_secs = match &err {
                AppError::TooManyRequests { retry_after_secs, .. } => *retry_after_secs,
                _ => 0,
            };
            let mut response = ApiError(err).into_response();
            RateStatus {
                limit: policy.limit,
                remaining: 0,
                reset_after_secs: retry_after_secs,
            }
            .apply(response.headers_mut());
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(limit: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(RatePolicy {
            limit,
            window: Duration::from_secs(secs),
            message: "Too many attempts. Please try again later.",
        })
    }

    #[test]
    fn test_budget_then_reject() {
        let limiter = limiter(3, 60);
        let now = Instant::now();

        assert_eq!(limiter.check_at("ip", now).unwrap().remaining, 2);
        assert_eq!(limiter.check_at("ip", now).unwrap().remaining, 1);
        assert_eq!(limiter.check_at("ip", now).unwrap().remaining, 0);

        let err = limiter.check_at("ip", now).unwrap_err();
        assert_eq!(err.code(), "MANY_REQUESTS");
        assert_eq!(err.to_string(), "Too many attempts. Please try again later.");
        assert!(matches!(err, AppError::TooManyRequests { retry_after_secs: 60, .. }));
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1, 60);
        let start = Instant::now();

        assert!(limiter.check_at("ip", start).is_ok());
        assert!(limiter.check_at("ip", start + Duration::from_secs(59)).is_err());
        assert!(limiter.check_at("ip", start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.check_at("a@x.io", now).is_ok());
        assert!(limiter.check_at("a@x.io", now).is_err());
        assert!(limiter.check_at("b@x.io", now).is_ok());
    }

    #[test]
    fn test_reset_counts_down() {
        let limiter = limiter(5, 900);
        let start = Instant::now();

        limiter.check_at("ip", start).unwrap();
        let status = limiter.check_at("ip", start + Duration::from_secs(300)).unwrap();
        assert_eq!(status.reset_after_secs, 600);
    }

    #[test]
    fn test_default_policies() {
        let limiters = Limiters::new(true);
        assert_eq!(limiters.validate_invite.policy().limit, 50);
        assert_eq!(limiters.forgot_password_ip.policy().limit, 10);
        assert_eq!(limiters.forgot_password_email.policy().limit, 3);
        assert_eq!(limiters.reset_password.policy().limit, 20);
        assert_eq!(limiters.super_admin_login.policy().limit, 5);
        assert_eq!(limiters.super_admin_login.policy().window, FIFTEEN_MINUTES);
    }

    #[test]
    fn test_client_ip() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, true), "203.0.113.7");
        assert_eq!(client_ip(&request, false), "unknown");

        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(&request, true), "192.0.2.1");
    }

    #[test]
    fn test_status_headers() {
        let mut headers = HeaderMap::new();
        RateStatus {
            limit: 5,
            remaining: 4,
            reset_after_secs: 900,
        }
        .apply(&mut headers);

        assert_eq!(headers["ratelimit-limit"], "5");
        assert_eq!(headers["ratelimit-remaining"], "4");
        assert_eq!(headers["ratelimit-reset"], "900");
    }
}
