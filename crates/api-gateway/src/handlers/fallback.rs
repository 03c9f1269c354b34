//! Responses for requests no route handles.
//!
//! Unmatched paths, unsupported methods and middleware failures still go
//! through `GatewayError`, so they carry the same body and correlation id as
//! every other error.

use crate::errors::GatewayError;
use axum::{
    http::{Method, Uri},
    BoxError,
};
use tower::timeout::error::Elapsed;

/// Fallback for paths with no route.
pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("Route {}", uri.path()))
}

/// Fallback for known paths called with an unsupported method.
pub async fn method_not_allowed(method: Method) -> GatewayError {
    GatewayError::MethodNotAllowed(method.to_string())
}

/// Maps errors from fallible tower middleware (the request timeout).
pub async fn handle_middleware_error(err: BoxError) -> GatewayError {
    if err.is::<Elapsed>() {
        tracing::warn!(target: "gw.request", "Request exceeded timeout");
        GatewayError::Timeout
    } else {
        GatewayError::Internal(format!("unhandled middleware error: {err}"))
    }
}
