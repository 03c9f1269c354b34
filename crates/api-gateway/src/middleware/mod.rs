//! HTTP middleware for the gateway.
//!
//! # Components
//!
//! - `request_context` - Correlation id, request logging, panic conversion
//! - `http_metrics` - Request counters and latency histograms
//! - `rate_limit` - Per-client admission control
//! - `auth` - Identity resolution for protected routes

pub mod auth;
pub mod http_metrics;
pub mod rate_limit;
pub mod request_context;

pub use auth::{require_identity, AuthState};
pub use http_metrics::http_metrics_middleware;
pub use rate_limit::{rate_limit, ClientKeyExtractor, PeerAddress, RateLimitState};
pub use request_context::{current_request_id, panic_response, request_context, RequestId};
