//! JWT claims structure.
//!
//! Contains the claims extracted from identity-provider access tokens. The
//! `sub`, `email` and `phone` fields are redacted in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a set of claims was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClaimsOrigin {
    /// Signature, expiry and subject checks all passed.
    Verified,

    /// Decoded without signature verification (development policy only).
    #[default]
    Unverified,
}

/// Claims carried by an access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Contact email, when the provider includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Contact phone number, when the provider includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Provider role (e.g. `authenticated`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Set by the verifier; never read from the token.
    #[serde(skip)]
    pub origin: ClaimsOrigin,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("phone", &self.phone.as_ref().map(|_| "[REDACTED]"))
            .field("role", &self.role)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Claims {
    /// Whether the claims passed full cryptographic verification.
    pub fn is_verified(&self) -> bool {
        self.origin == ClaimsOrigin::Verified
    }
}

/// Token payload as sent, before presence checks.
///
/// Every field is optional so that a missing claim can be reported as its own
/// error instead of a generic decode failure.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenPayload {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenPayload {
    /// Non-empty subject, if present.
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Build claims once the subject is known to be present.
    pub fn into_claims(self, sub: String, origin: ClaimsOrigin) -> Claims {
        Claims {
            sub,
            email: non_empty(self.email),
            phone: non_empty(self.phone),
            role: non_empty(self.role),
            exp: self.exp.unwrap_or_default(),
            iat: self.iat.unwrap_or_default(),
            origin,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
