//! Current user handler.
//!
//! Minimal consumer of the identity resolver: echoes who the caller is.

use crate::auth::{Identity, IdentitySource};
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// Response for `/api/v1/users/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl From<Identity> for MeResponse {
    fn from(identity: Identity) -> Self {
        // Raw identifiers carry no claims.
        if identity.source == IdentitySource::RawIdentifier {
            return Self {
                user_id: identity.user_id,
                email: None,
                phone: None,
                role: None,
            };
        }

        Self {
            user_id: identity.user_id,
            email: identity.email,
            phone: identity.phone,
            role: identity.role,
        }
    }
}

/// Handler for GET /api/v1/users/me
///
/// Requires the `require_identity` route layer.
///
/// ```json
/// {
///   "user_id": "8d6f0c1e-...",
///   "email": "someone@example.com"
/// }
/// ```
#[instrument(skip_all, name = "gw.handlers.me")]
pub async fn get_me(Extension(identity): Extension<Identity>) -> Json<MeResponse> {
    tracing::debug!(target: "gw.handlers.me", source = ?identity.source, "Returning caller identity");
    Json(identity.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn identity(source: IdentitySource) -> Identity {
        Identity {
            user_id: "user-42".to_string(),
            email: Some("user-42@example.com".to_string()),
            phone: None,
            role: Some("authenticated".to_string()),
            source,
        }
    }

    #[test]
    fn test_verified_identity_includes_contact_claims() {
        let json = serde_json::to_value(MeResponse::from(identity(IdentitySource::VerifiedToken))).unwrap();

        assert_eq!(json["user_id"], "user-42");
        assert_eq!(json["email"], "user-42@example.com");
        assert_eq!(json["role"], "authenticated");
        assert!(json.get("phone").is_none(), "phone should be omitted when None");
    }

    #[test]
    fn test_raw_identifier_has_only_user_id() {
        let json = serde_json::to_value(MeResponse::from(identity(IdentitySource::RawIdentifier))).unwrap();

        assert_eq!(json, serde_json::json!({ "user_id": "user-42" }));
    }
}
