//! Gateway error types.
//!
//! `GatewayError` is the only error type that crosses the HTTP boundary. All
//! variants map to a status code and a stable `code` string via the
//! `IntoResponse` impl, and every error body carries the correlation id of
//! the request being handled. Server-side failures log their detail and
//! return a generic message.

use crate::auth::identity::AuthError;
use crate::auth::jwks::KeyFetchError;
use crate::auth::jwt::TokenError;
use crate::middleware::request_context::current_request_id;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Value of the `WWW-Authenticate` header on 401 responses.
const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"api\", error=\"invalid_token\"";

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - AuthMissing, AuthMalformed, AuthInvalid: 401 Unauthorized
/// - AuthorizationDenied: 403 Forbidden
/// - BadRequest: 400 Bad Request
/// - NotFound: 404 Not Found
/// - MethodNotAllowed: 405 Method Not Allowed
/// - Timeout: 408 Request Timeout
/// - RateLimited: 429 Too Many Requests
/// - VerificationService: 503 when transient, 500 otherwise
/// - ServiceUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authentication required")]
    AuthMissing,

    #[error("Malformed authorization header")]
    AuthMalformed,

    #[error("Invalid credential: {0}")]
    AuthInvalid(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Verification service error: {detail}")]
    VerificationService { transient: bool, detail: String },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthMissing | GatewayError::AuthMalformed | GatewayError::AuthInvalid(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Timeout => StatusCode::REQUEST_TIMEOUT,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::VerificationService { transient: true, .. }
            | GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::VerificationService { transient: false, .. }
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AuthMissing => "AUTH_MISSING",
            GatewayError::AuthMalformed => "AUTH_MALFORMED",
            GatewayError::AuthInvalid(_) => "AUTH_INVALID",
            GatewayError::AuthorizationDenied(_) => "AUTHORIZATION_DENIED",
            GatewayError::BadRequest(_) => "VALIDATION_ERROR",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            GatewayError::Timeout => "REQUEST_TIMEOUT",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::VerificationService { .. } => "VERIFICATION_SERVICE_ERROR",
            GatewayError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to the caller.
    fn client_message(&self) -> String {
        match self {
            GatewayError::AuthMissing => "Authentication required".to_string(),
            GatewayError::AuthMalformed => "Malformed authorization header".to_string(),
            GatewayError::AuthInvalid(reason)
            | GatewayError::AuthorizationDenied(reason)
            | GatewayError::BadRequest(reason) => reason.clone(),
            GatewayError::NotFound(resource) => format!("{resource} not found"),
            GatewayError::MethodNotAllowed(method) => format!("Method {method} is not allowed"),
            GatewayError::Timeout => "Request timed out".to_string(),
            GatewayError::RateLimited { .. } => {
                "Too many requests. Please try again later.".to_string()
            }
            GatewayError::VerificationService { .. } => {
                "Unable to verify credentials at this time".to_string()
            }
            GatewayError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            GatewayError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    request_id: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = current_request_id();

        // Log server-side detail; the client only sees the generic message.
        match &self {
            GatewayError::VerificationService { transient, detail } => {
                tracing::error!(
                    target: "gw.errors",
                    request_id = %request_id,
                    transient = transient,
                    detail = %detail,
                    "Credential verification service failed"
                );
            }
            GatewayError::ServiceUnavailable(detail) => {
                tracing::warn!(target: "gw.errors", request_id = %request_id, detail = %detail, "Service unavailable");
            }
            GatewayError::Internal(detail) => {
                tracing::error!(target: "gw.errors", request_id = %request_id, detail = %detail, "Internal error");
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                kind: if status.is_server_error() {
                    "server_error"
                } else {
                    "client_error"
                },
                message: self.client_message(),
                request_id,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
            );
        }

        if let GatewayError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

impl From<KeyFetchError> for GatewayError {
    fn from(err: KeyFetchError) -> Self {
        GatewayError::VerificationService {
            transient: err.is_transient(),
            detail: err.to_string(),
        }
    }
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::TokenMissing => GatewayError::AuthMissing,
            TokenError::VerificationService(fetch) => fetch.into(),
            other => GatewayError::AuthInvalid(other.to_string()),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthMissing => GatewayError::AuthMissing,
            AuthError::AuthMalformed => GatewayError::AuthMalformed,
            AuthError::AuthInvalid(reason) => GatewayError::AuthInvalid(reason),
            AuthError::VerificationService(fetch) => fetch.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::request_context::{RequestId, REQUEST_ID};
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::AuthMissing.status_code(), 401);
        assert_eq!(GatewayError::AuthMalformed.status_code(), 401);
        assert_eq!(GatewayError::AuthInvalid("x".into()).status_code(), 401);
        assert_eq!(
            GatewayError::AuthorizationDenied("x".into()).status_code(),
            403
        );
        assert_eq!(GatewayError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(GatewayError::NotFound("x".into()).status_code(), 404);
        assert_eq!(
            GatewayError::MethodNotAllowed("PUT".into()).status_code(),
            405
        );
        assert_eq!(GatewayError::Timeout.status_code(), 408);
        assert_eq!(
            GatewayError::RateLimited {
                retry_after_secs: 1
            }
            .status_code(),
            429
        );
        assert_eq!(
            GatewayError::VerificationService {
                transient: true,
                detail: "x".into()
            }
            .status_code(),
            503
        );
        assert_eq!(
            GatewayError::VerificationService {
                transient: false,
                detail: "x".into()
            }
            .status_code(),
            500
        );
        assert_eq!(
            GatewayError::ServiceUnavailable("x".into()).status_code(),
            503
        );
        assert_eq!(GatewayError::Internal("x".into()).status_code(), 500);
    }

    #[tokio::test]
    async fn test_into_response_auth_invalid_has_www_authenticate() {
        let response = GatewayError::AuthInvalid("Token has expired".into()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(www_auth.contains("Bearer realm=\"api\""));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "AUTH_INVALID");
        assert_eq!(body["error"]["type"], "client_error");
        assert_eq!(body["error"]["message"], "Token has expired");
    }

    #[tokio::test]
    async fn test_into_response_outside_request_uses_unknown_id() {
        let response = GatewayError::AuthMissing.into_response();
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["request_id"], "unknown");
    }

    #[tokio::test]
    async fn test_into_response_carries_request_id() {
        let response = REQUEST_ID
            .scope(RequestId("ab12cd34".to_string()), async {
                GatewayError::NotFound("Post".into()).into_response()
            })
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["request_id"], "ab12cd34");
        assert_eq!(body["error"]["message"], "Post not found");
    }

    #[tokio::test]
    async fn test_into_response_timeout_is_client_error() {
        let response = GatewayError::Timeout.into_response();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
        assert_eq!(body["error"]["type"], "client_error");
        assert_eq!(body["error"]["message"], "Request timed out");
    }

    #[tokio::test]
    async fn test_into_response_rate_limited_sets_retry_after() {
        let response = GatewayError::RateLimited {
            retry_after_secs: 17,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "17");
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_into_response_internal_hides_detail() {
        let response =
            GatewayError::Internal("panicked at src/handlers/me.rs:12".into()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["type"], "server_error");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(!body.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn test_into_response_verification_service_hides_detail() {
        let response: Response = GatewayError::from(KeyFetchError::Timeout).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "VERIFICATION_SERVICE_ERROR");
        assert!(!body.to_string().contains("timed out"));
    }

    #[test]
    fn test_from_key_fetch_error_permanent_is_500() {
        let err: GatewayError = KeyFetchError::NoUsableKey.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_from_token_error() {
        assert!(matches!(
            GatewayError::from(TokenError::TokenMissing),
            GatewayError::AuthMissing
        ));
        assert!(matches!(
            GatewayError::from(TokenError::SignatureInvalid),
            GatewayError::AuthInvalid(_)
        ));
        assert!(matches!(
            GatewayError::from(TokenError::VerificationService(KeyFetchError::Status(502))),
            GatewayError::VerificationService {
                transient: true,
                ..
            }
        ));
    }

    #[test]
    fn test_from_auth_error() {
        assert!(matches!(
            GatewayError::from(AuthError::AuthMissing),
            GatewayError::AuthMissing
        ));
        assert!(matches!(
            GatewayError::from(AuthError::AuthMalformed),
            GatewayError::AuthMalformed
        ));
        assert!(matches!(
            GatewayError::from(AuthError::AuthInvalid("bad".into())),
            GatewayError::AuthInvalid(reason) if reason == "bad"
        ));
    }
}
