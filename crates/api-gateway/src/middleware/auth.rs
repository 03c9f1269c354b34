//! Authentication middleware for protected routes.
//!
//! Resolves the caller through the [`IdentityResolver`] and injects the
//! resulting [`Identity`] into request extensions.

use crate::auth::{Identity, IdentityResolver};
use crate::errors::GatewayError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<IdentityResolver>,
}

/// Authentication middleware that requires a resolvable identity.
///
/// # Response
///
/// - 401 with `WWW-Authenticate` when the credential is missing, malformed
///   or rejected
/// - 500/503 when the signing key set cannot be obtained
/// - Otherwise continues with `Identity` in extensions
#[instrument(skip_all, name = "gw.middleware.auth")]
pub async fn require_identity(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| {
            tracing::debug!(target: "gw.middleware.auth", "Authorization header is not valid UTF-8");
            GatewayError::AuthMalformed
        })?),
        None => None,
    };

    let identity: Identity = state.resolver.resolve(header).await?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
