//! Rate limiting middleware.
//!
//! Runs before any identity resolution. The client key comes from a
//! [`ClientKeyExtractor`]; the default keys on the socket peer address so a
//! caller cannot dodge the limit by varying its credential.

use crate::errors::GatewayError;
use crate::observability::metrics::record_rate_limit_decision;
use crate::services::rate_limiter::{Decision, RateLimiter};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const RETRY_AFTER_HEADER: &str = "x-ratelimit-retry-after";

/// Derives the rate-limit key for a request.
pub trait ClientKeyExtractor: Send + Sync + fmt::Debug {
    fn client_key(&self, request: &Request) -> String;
}

/// Keys on the peer IP address, `"unknown"` when no peer is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddress;

impl ClientKeyExtractor for PeerAddress {
    fn client_key(&self, request: &Request) -> String {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
    }
}

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub extractor: Arc<dyn ClientKeyExtractor>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            extractor: Arc::new(PeerAddress),
        }
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    let reset = chrono::Utc::now().timestamp()
        + i64::try_from(decision.reset_after.as_secs()).unwrap_or(i64::MAX);

    set_header(headers, LIMIT_HEADER, decision.limit);
    set_header(headers, REMAINING_HEADER, decision.remaining);
    set_header(headers, RESET_HEADER, reset);
    if let Some(secs) = decision.retry_after_secs() {
        set_header(headers, RETRY_AFTER_HEADER, secs);
    }
}

/// Admit or reject the request, then stamp rate-limit headers on the response.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let client = state.extractor.client_key(&request);
    let decision = state.limiter.admit(&client, Instant::now());
    record_rate_limit_decision(decision.is_admitted());

    let mut response = match decision.retry_after_secs() {
        Some(retry_after_secs) => {
            tracing::warn!(
                target: "gw.middleware.rate_limit",
                client = %client,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            GatewayError::RateLimited { retry_after_secs }.into_response()
        }
        None => next.run(request).await,
    };

    apply_headers(response.headers_mut(), &decision);
    response
}
