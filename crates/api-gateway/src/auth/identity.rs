//! Identity resolution.
//!
//! [`IdentityResolver::resolve`] is the single entry point handlers use to
//! learn who is calling. It parses the `Authorization` header, sends signed
//! tokens to the [`TokenVerifier`] and hands everything the strict path
//! cannot accept to the credential policy.

use crate::auth::claims::Claims;
use crate::auth::jwt::{TokenError, TokenVerifier};
use crate::auth::jwks::KeyFetchError;
use crate::auth::policy::CredentialPolicy;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Signed tokens start with a base64url-encoded `{"` header.
const STRUCTURED_PREFIX: &str = "eyJ";

/// Shortest credential treated as a signed token.
const STRUCTURED_MIN_LEN: usize = 51;

/// Where an identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Fully verified token.
    VerifiedToken,
    /// Token payload decoded without verification (development only).
    UnverifiedToken,
    /// Raw identifier header (development only).
    RawIdentifier,
}

/// The caller of the current request.
#[derive(Clone)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub source: IdentitySource,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &"[REDACTED]")
            .field("role", &self.role)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Identity {
    pub fn from_claims(claims: Claims) -> Self {
        let source = if claims.is_verified() {
            IdentitySource::VerifiedToken
        } else {
            IdentitySource::UnverifiedToken
        };

        Self {
            user_id: claims.sub,
            email: claims.email,
            phone: claims.phone,
            role: claims.role,
            source,
        }
    }
}

/// Identity resolution failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header is missing")]
    AuthMissing,

    #[error("Authorization header is malformed")]
    AuthMalformed,

    /// Carries a reason that is safe to return to the caller.
    #[error("{0}")]
    AuthInvalid(String),

    #[error("Credential verification service unavailable: {0}")]
    VerificationService(KeyFetchError),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::TokenMissing => AuthError::AuthMissing,
            TokenError::VerificationService(fetch) => AuthError::VerificationService(fetch),
            other => AuthError::AuthInvalid(other.to_string()),
        }
    }
}

/// Parsed form of the `Authorization` header value.
#[derive(Debug, PartialEq, Eq)]
enum Credential<'a> {
    Structured(&'a str),
    Raw(&'a str),
}

/// Strip the optional `Bearer` scheme and classify the credential.
///
/// The scheme name matches case-insensitively, as HTTP auth schemes do.
fn parse_credential(header: &str) -> Result<Credential<'_>, AuthError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(AuthError::AuthMissing);
    }

    let value = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        None if header.eq_ignore_ascii_case("bearer") => "",
        _ => header,
    };

    if value.is_empty() {
        return Err(AuthError::AuthMalformed);
    }

    if value.starts_with(STRUCTURED_PREFIX) && value.len() >= STRUCTURED_MIN_LEN {
        Ok(Credential::Structured(value))
    } else {
        Ok(Credential::Raw(value))
    }
}

/// Resolves the caller identity for a request.
pub struct IdentityResolver {
    verifier: Arc<TokenVerifier>,
    policy: Arc<dyn CredentialPolicy>,
}

impl IdentityResolver {
    pub fn new(verifier: Arc<TokenVerifier>, policy: Arc<dyn CredentialPolicy>) -> Self {
        Self { verifier, policy }
    }

    /// Resolve an identity from the `Authorization` header value.
    ///
    /// # Errors
    ///
    /// - `AuthMissing` - no header, or a blank one
    /// - `AuthMalformed` - the `Bearer` scheme with no credential
    /// - `AuthInvalid` - the credential was rejected
    /// - `VerificationService` - the key set could not be obtained (strict policy)
    #[instrument(skip_all)]
    pub async fn resolve(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let Some(header) = header else {
            tracing::debug!(target: "gw.auth.identity", "Missing Authorization header");
            return Err(AuthError::AuthMissing);
        };

        match parse_credential(header)? {
            Credential::Structured(token) => match self.verifier.verify(token).await {
                Ok(claims) => Ok(Identity::from_claims(claims)),
                Err(error) => {
                    tracing::debug!(target: "gw.auth.identity", error = %error, "Token rejected");
                    self.policy.on_verification_failure(token, error)
                }
            },
            Credential::Raw(raw) => self.policy.on_raw_identifier(raw),
        }
    }
}
