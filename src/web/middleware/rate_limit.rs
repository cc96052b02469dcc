//! Rate limiting middleware.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use crate::config::WebConfig;
use crate::web::error::ApiError;

/// How often idle client entries are dropped.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Client address resolved by [`register_rate_limit`], stored in request
/// extensions for the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub Option<String>);

/// Per-client limiter for public submissions.
pub struct RateLimitState {
    limiter: DefaultKeyedRateLimiter<String>,
    requests_per_minute: u32,
    trust_proxy_headers: bool,
}

impl RateLimitState {
    /// Create a limiter allowing `requests_per_minute` submissions per client.
    ///
    /// Clients are keyed by peer address until [`Self::with_proxy_headers`]
    /// says otherwise.
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            requests_per_minute: per_minute.get(),
            trust_proxy_headers: false,
        }
    }

    /// Create a limiter from web configuration.
    pub fn from_config(config: &WebConfig) -> Self {
        Self::new(config.register_rate_limit).with_proxy_headers(config.trust_proxy_headers)
    }

    /// Key clients by the proxy's forwarding headers instead of the peer.
    pub fn with_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Whether forwarding headers are trusted.
    pub fn trusts_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    /// Configured quota.
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Check if a request from `client` is allowed, consuming one cell if so.
    pub fn check(&self, client: &str) -> bool {
        self.limiter.check_key(&client.to_string()).is_ok()
    }

    /// Drop clients whose quota has fully replenished.
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Start a background task to periodically clean up idle clients.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.cleanup();
                tracing::debug!(clients = self.tracked_clients(), "Rate limiter cleaned up");
            }
        });
    }
}

/// Best-effort client address.
///
/// With `trust_proxy_headers` the first hop of `X-Forwarded-For` wins, then
/// `X-Real-IP`. Otherwise, and when neither header is set, the peer address of
/// the connection is used; a direct client cannot pick its own key.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<String> {
    let peer = peer.map(|addr| addr.ip().to_string());
    if !trust_proxy_headers {
        return peer;
    }

    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    peer
}

/// Rate limiting middleware for the registration endpoint.
pub async fn register_rate_limit(
    state: Arc<RateLimitState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let resolved = client_ip(req.headers(), peer, state.trust_proxy_headers);
    let key = resolved.as_deref().unwrap_or("unknown");

    if !state.check(key) {
        tracing::warn!(ip = %key, "Registration rate limit exceeded");
        return ApiError::too_many_requests("Too many requests. Please try again later.")
            .into_response();
    }

    req.extensions_mut().insert(ClientAddr(resolved));
    next.run(req).await
}
