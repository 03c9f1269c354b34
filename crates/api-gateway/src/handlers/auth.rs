//! Authentication flow handlers.
//!
//! Forgot-password always answers with the same success body once the input
//! is valid, so callers cannot probe which addresses have accounts.

use crate::errors::GatewayError;
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

pub const RESET_LINK_SENT_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Shape check only; the identity provider decides what is deliverable.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Handler for POST /api/v1/auth/forgot-password
///
/// # Errors
///
/// `BadRequest` when the body is not JSON or the email is missing or
/// malformed. Provider failures are logged and never returned.
#[instrument(skip_all, name = "gw.handlers.forgot_password")]
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ForgotPasswordResponse>, GatewayError> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(target: "gw.handlers.auth", error = %e, "Rejected forgot-password body");
        GatewayError::BadRequest("Request body must be a JSON object with an email".to_string())
    })?;

    let email = request.email.as_deref().map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err(GatewayError::BadRequest("Email is required".to_string()));
    }
    if !is_plausible_email(email) {
        return Err(GatewayError::BadRequest("Email address is invalid".to_string()));
    }

    if let Err(e) = state.password_recovery.send_reset_email(email).await {
        tracing::warn!(
            target: "gw.handlers.auth",
            error = %e,
            "Password recovery request failed; returning success body"
        );
    }

    Ok(Json(ForgotPasswordResponse {
        success: true,
        message: RESET_LINK_SENT_MESSAGE,
    }))
}
