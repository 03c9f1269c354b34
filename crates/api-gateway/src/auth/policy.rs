//! Credential policy.
//!
//! Every place where development mode relaxes verification goes through this
//! trait. The policy is chosen once at startup by [`policy_for`] and injected
//! into the token verifier and identity resolver; nothing else reads the
//! development flag.

use crate::auth::claims::{ClaimsOrigin, TokenPayload};
use crate::auth::identity::{AuthError, Identity, IdentitySource};
use crate::auth::jwks::KeyFetchError;
use crate::auth::jwt::TokenError;
use crate::auth::Claims;
use common::jwt::decode_payload_unverified;
use std::fmt;
use std::sync::Arc;

/// Decisions taken when strict verification cannot complete.
pub trait CredentialPolicy: Send + Sync + fmt::Debug {
    /// The signing key could not be obtained for a structurally valid token.
    fn on_key_unavailable(&self, token: &str, error: &KeyFetchError) -> Result<Claims, TokenError>;

    /// The token verifier rejected a structured credential.
    fn on_verification_failure(&self, token: &str, error: TokenError) -> Result<Identity, AuthError>;

    /// The credential is not a signed token.
    fn on_raw_identifier(&self, raw: &str) -> Result<Identity, AuthError>;

    /// Used for startup logging only.
    fn is_development(&self) -> bool;
}

/// Production policy: every failure propagates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl CredentialPolicy for StrictPolicy {
    fn on_key_unavailable(&self, _token: &str, error: &KeyFetchError) -> Result<Claims, TokenError> {
        Err(TokenError::VerificationService(error.clone()))
    }

    fn on_verification_failure(&self, _token: &str, error: TokenError) -> Result<Identity, AuthError> {
        Err(error.into())
    }

    fn on_raw_identifier(&self, _raw: &str) -> Result<Identity, AuthError> {
        tracing::debug!(target: "gw.auth.identity", "Raw identifier rejected");
        Err(AuthError::AuthInvalid(
            "Credential is not a valid token".to_string(),
        ))
    }

    fn is_development(&self) -> bool {
        false
    }
}

/// Local-testing policy.
///
/// Accepts raw identifiers and falls back to an unverified decode when the
/// key set is unreachable or the token could not be parsed. Tokens rejected
/// by or after the signature check (bad signature, expired, invalid claims)
/// stay rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevelopmentPolicy;

impl DevelopmentPolicy {
    fn decode_unverified(token: &str) -> Result<Claims, TokenError> {
        let payload: TokenPayload =
            decode_payload_unverified(token).map_err(|_| TokenError::TokenMalformed)?;
        let sub = payload
            .subject()
            .ok_or(TokenError::ClaimMissingSubject)?
            .to_string();

        tracing::warn!(
            target: "gw.auth.jwt",
            "Accepting unverified token payload (development mode)"
        );
        Ok(payload.into_claims(sub, ClaimsOrigin::Unverified))
    }
}

impl CredentialPolicy for DevelopmentPolicy {
    fn on_key_unavailable(&self, token: &str, _error: &KeyFetchError) -> Result<Claims, TokenError> {
        Self::decode_unverified(token)
    }

    fn on_verification_failure(&self, token: &str, error: TokenError) -> Result<Identity, AuthError> {
        if error.is_conclusive() || error == TokenError::TokenMissing {
            return Err(error.into());
        }

        match Self::decode_unverified(token) {
            Ok(claims) => Ok(Identity::from_claims(claims)),
            Err(_) => Err(error.into()),
        }
    }

    fn on_raw_identifier(&self, raw: &str) -> Result<Identity, AuthError> {
        tracing::warn!(
            target: "gw.auth.identity",
            "Accepting raw identifier as identity (development mode)"
        );
        Ok(Identity {
            user_id: raw.to_string(),
            email: None,
            phone: None,
            role: None,
            source: IdentitySource::RawIdentifier,
        })
    }

    fn is_development(&self) -> bool {
        true
    }
}

/// Select the policy for the configured mode.
pub fn policy_for(dev_mode: bool) -> Arc<dyn CredentialPolicy> {
    if dev_mode {
        Arc::new(DevelopmentPolicy)
    } else {
        Arc::new(StrictPolicy)
    }
}
