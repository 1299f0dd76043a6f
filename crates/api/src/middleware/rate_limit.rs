//! Per-client rate limiting.
//!
//! Clients are keyed by peer address. `X-Forwarded-For` is only consulted
//! when the peer is one of `security.trusted_proxies`. Two budgets exist: a
//! general request budget for the whole API and a tighter one for credential
//! checks (admin sign-in and kiosk unlock).

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{Arc, PoisonError, RwLock},
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};

use crate::app::AppState;
use crate::error::ApiError;

type ClientRateLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiters keyed by client, all sharing one per-minute quota.
pub struct RateLimiterState {
    limiters: RwLock<HashMap<String, Arc<ClientRateLimiter>>>,
    per_minute: NonZeroU32,
}

impl RateLimiterState {
    /// A zero budget is raised to one request per minute.
    pub fn new(per_minute: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            per_minute: NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN),
        }
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute.get()
    }

    fn get_or_create_limiter(&self, key: &str) -> Arc<ClientRateLimiter> {
        if let Some(limiter) = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return limiter.clone();
        }

        let mut limiters = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(GovRateLimiter::direct(Quota::per_minute(self.per_minute))))
            .clone()
    }

    /// Takes one unit of `key`'s budget. On exhaustion returns the number of
    /// seconds to wait, at least 1.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let limiter = self.get_or_create_limiter(key);
        limiter.check().map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }

    /// Drops limiters whose budget is fully replenished.
    pub fn prune(&self) -> usize {
        let mut limiters = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        let before = limiters.len();
        limiters.retain(|_, limiter| {
            // A limiter at full capacity can admit the whole quota again.
            limiter.check_n(self.per_minute).map(|r| r.is_err()).unwrap_or(true)
        });
        before - limiters.len()
    }

    pub fn len(&self) -> usize {
        self.limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("per_minute", &self.per_minute)
            .field("active_limiters", &self.len())
            .finish()
    }
}

/// Identifies the calling client for rate limiting.
///
/// Behind trusted proxies the forwarded chain is walked from the nearest hop
/// and the first address that is not a trusted proxy wins. Hops further left
/// are client-supplied and never used.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect();

    let mut client = peer;
    for hop in hops.into_iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => client = ip,
            Ok(ip) => return ip.to_string(),
            Err(_) => break,
        }
    }
    client.to_string()
}

fn request_client_key(req: &Request<Body>, trusted_proxies: &[IpAddr]) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_key(req.headers(), peer, trusted_proxies)
}

fn enforce(limiter: &RateLimiterState, key: &str, scope: &'static str) -> Result<(), ApiError> {
    limiter.check(key).map_err(|retry_after| {
        tracing::warn!(client = %key, scope, retry_after, "Rate limit exceeded");
        ApiError::RateLimited { retry_after }
    })
}

/// General request budget. Disabled when `security.rate_limit_per_minute` is 0.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let key = request_client_key(&req, &state.config.security.trusted_proxies);
        if let Err(err) = enforce(limiter, &key, "api") {
            return err.into_response();
        }
    }
    next.run(req).await
}

/// Credential-check budget for sign-in and kiosk unlock routes.
pub async fn sign_in_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = request_client_key(&req, &state.config.security.trusted_proxies);
    if let Err(err) = enforce(&state.sign_in_limiter, &key, "sign_in") {
        return err.into_response();
    }
    next.run(req).await
}
