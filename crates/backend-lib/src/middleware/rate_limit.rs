// ============================
// crates/backend-lib/src/middleware/rate_limit.rs
// ============================
//! Fixed-window rate limiting per client IP for the HTTP API.
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use crate::error::AppError;
use crate::AppState;

/// Requests seen from one client in the current window
#[derive(Debug, Clone)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    clients: Arc<DashMap<IpAddr, RateLimitEntry>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            window,
            max_requests,
        }
    }

    /// Count one request from `ip`
    pub fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entry = self.clients.entry(ip).or_insert_with(|| RateLimitEntry {
            requests: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.requests = 0;
            entry.window_start = now;
        }

        if entry.requests >= self.max_requests {
            return Err(AppError::RateLimitExceeded);
        }
        entry.requests += 1;
        Ok(())
    }

    /// Drop entries whose window has passed
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.clients
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Client address: `x-real-ip` when a proxy set it, otherwise the peer
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

/// Rate limiter middleware
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // unknown clients share one bucket
    let ip = client_ip(&request).unwrap_or(IpAddr::from([0, 0, 0, 0]));

    if let Err(e) = state.rate_limiter.check(ip) {
        warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_ip() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let a = IpAddr::from([10, 0, 0, 1]);
        let b = IpAddr::from([10, 0, 0, 2]);

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_ok());
        assert!(matches!(limiter.check(a), Err(AppError::RateLimitExceeded)));
        assert!(limiter.check(b).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);
        let ip = IpAddr::from([10, 0, 0, 1]);

        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_err());

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check(ip).is_ok());
    }

    #[test]
    fn test_purge_expired() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 5);
        limiter.check(IpAddr::from([10, 0, 0, 1])).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        limiter.purge_expired();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_ip_prefers_header() {
        let request = Request::builder()
            .uri("/")
            .header("x-real-ip", "192.168.1.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some(IpAddr::from([192, 168, 1, 9])));

        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&request), Some(IpAddr::from([127, 0, 0, 1])));
    }
}
