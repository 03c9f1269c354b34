//! Health check handlers.
//!
//! `/health` is liveness only. `/ready` checks that the signing key set can
//! be obtained, since no protected route can succeed without it.

use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

const SERVICE_NAME: &str = "api-gateway";

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub jwks: &'static str,
}

/// Handler for GET /health
#[instrument(skip_all, name = "gw.health.liveness")]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler for GET /ready
///
/// Returns 503 with the unhealthy dependency named, rather than an error
/// body, so orchestrators can read it.
///
/// ```json
/// { "status": "ready", "jwks": "healthy" }
/// ```
#[instrument(skip_all, name = "gw.health.readiness")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.key_cache.check_available().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                jwks: "healthy",
            }),
        ),
        Err(e) => {
            tracing::warn!(target: "gw.health", error = %e, "Readiness check failed: key set unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    jwks: "unhealthy",
                }),
            )
        }
    }
}
