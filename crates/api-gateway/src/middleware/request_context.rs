//! Request correlation.
//!
//! Outermost middleware. Assigns each request a short correlation id before
//! anything else runs, exposes it to handlers and to error rendering, and
//! stamps `X-Request-ID` and `X-Process-Time` on every response.

use crate::errors::GatewayError;
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::Instrument;

/// Correlation id header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Processing time header (seconds, three decimals).
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

const REQUEST_ID_LEN: usize = 8;

/// Correlation id of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(id.get(..REQUEST_ID_LEN).unwrap_or(&id).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

tokio::task_local! {
    /// Correlation id of the request being handled on this task.
    pub static REQUEST_ID: RequestId;
}

/// Correlation id of the request in flight, or `"unknown"` outside one.
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|id| id.0.clone())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Middleware assigning the correlation id and logging the request.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = RequestId::generate();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());

    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "gw.request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    tracing::info!(target: "gw.request", parent: &span, client = %client, "Request started");

    let mut response = REQUEST_ID
        .scope(request_id.clone(), next.run(request))
        .instrument(span.clone())
        .await;

    let elapsed = start.elapsed();
    let status = response.status();
    let duration_ms = elapsed.as_millis();

    if status.is_client_error() || status.is_server_error() {
        tracing::warn!(
            target: "gw.request",
            parent: &span,
            status = status.as_u16(),
            duration_ms = duration_ms,
            "Request completed with error"
        );
    } else {
        tracing::info!(
            target: "gw.request",
            parent: &span,
            status = status.as_u16(),
            duration_ms = duration_ms,
            "Request completed"
        );
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}", elapsed.as_secs_f64())) {
        headers.insert(PROCESS_TIME_HEADER, value);
    }

    response
}

/// Convert a handler panic into a generic internal error.
///
/// Used with `tower_http::catch_panic::CatchPanicLayer::custom`. The panic
/// message is logged and never returned to the caller.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    GatewayError::Internal(format!("handler panicked: {detail}")).into_response()
}
