//! Metrics definitions for the API gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the fixed route set plus `/other`
//! - `status`: success, error, timeout
//! - `outcome` / `decision`: bounded by code

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by
/// `GET /metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g. already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Key fetches are bounded by the fetch timeout (10s by default)
        .set_buckets_for_metric(
            Matcher::Prefix("gw_jwks_fetch".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code` / `status`
///
/// Captures every response, including rate-limit rejections and
/// framework-level errors (404, 405, 415).
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the fixed endpoint label set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/users/me" => "/api/v1/users/me",
        "/api/v1/auth/forgot-password" => "/api/v1/auth/forgot-password",
        _ => "/other",
    }
}

// ============================================================================
// Credential Verification Metrics
// ============================================================================

/// Record a signing key set fetch.
///
/// Metric: `gw_jwks_fetch_total`, `gw_jwks_fetch_duration_seconds`
/// Labels: `status` (success, timeout, unreachable, http_error, malformed, no_usable_key)
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("gw_jwks_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("gw_jwks_fetch_total", "status" => status).increment(1);
}

/// Record a token verification outcome.
///
/// Metric: `gw_token_verifications_total`
/// Labels: `outcome` (verified, unverified_fallback, expired, malformed,
/// signature_invalid, missing_subject, missing, service_error)
pub fn record_token_verification(outcome: &'static str) {
    counter!("gw_token_verifications_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Rate Limiter Metrics
// ============================================================================

/// Record an admission decision.
///
/// Metric: `gw_rate_limit_decisions_total`
/// Labels: `decision` (admitted, rejected)
pub fn record_rate_limit_decision(admitted: bool) {
    let decision = if admitted { "admitted" } else { "rejected" };
    counter!("gw_rate_limit_decisions_total", "decision" => decision).increment(1);
}

/// Record the result of a sweep.
///
/// Metric: `gw_rate_limit_buckets` (gauge), `gw_rate_limit_swept_total`
#[allow(clippy::cast_precision_loss)]
pub fn record_rate_limit_sweep(removed: usize, remaining: usize) {
    counter!("gw_rate_limit_swept_total").increment(removed as u64);
    gauge!("gw_rate_limit_buckets").set(remaining as f64);
}
