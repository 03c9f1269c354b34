//! Token verification.
//!
//! Verifies identity-provider access tokens against keys from the
//! [`KeyCache`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; any other declared algorithm is a signature failure
//! - `exp` and `iat` are required; expiry has no leeway, `iat` is allowed the
//!   configured clock skew
//! - A key-fetch failure is handed to the credential policy. A cryptographic
//!   failure never is.

use crate::auth::claims::{Claims, ClaimsOrigin, TokenPayload};
use crate::auth::jwks::{KeyCache, KeyFetchError};
use crate::auth::policy::CredentialPolicy;
use crate::observability::metrics::record_token_verification;
use common::jwt::{decode_header, validate_iat};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// The only accepted signing algorithm.
const ACCEPTED_ALGORITHM: &str = "RS256";

/// Token verification failures.
///
/// Display strings are safe to return to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is missing")]
    TokenMissing,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has no subject")]
    ClaimMissingSubject,

    /// Signature verified, but `exp`/`iat` are missing or out of bounds.
    #[error("Token claims are invalid")]
    ClaimInvalid,

    #[error("Token verification service unavailable")]
    VerificationService(KeyFetchError),
}

impl TokenError {
    /// Failures that prove the token itself is bad: the signature was
    /// checked and either failed or held over unacceptable claims. Parse
    /// failures and an unreachable key set are not conclusive.
    pub fn is_conclusive(&self) -> bool {
        matches!(
            self,
            TokenError::SignatureInvalid
                | TokenError::TokenExpired
                | TokenError::ClaimInvalid
                | TokenError::ClaimMissingSubject
        )
    }

    fn metric_outcome(&self) -> &'static str {
        match self {
            TokenError::TokenMissing => "missing",
            TokenError::TokenExpired => "expired",
            TokenError::TokenMalformed => "malformed",
            TokenError::SignatureInvalid => "signature_invalid",
            TokenError::ClaimMissingSubject => "missing_subject",
            TokenError::ClaimInvalid => "claim_invalid",
            TokenError::VerificationService(_) => "service_error",
        }
    }
}

/// Verifies bearer tokens using the shared key cache.
pub struct TokenVerifier {
    key_cache: Arc<KeyCache>,
    policy: Arc<dyn CredentialPolicy>,
    clock_skew: Duration,
}

impl TokenVerifier {
    pub fn new(
        key_cache: Arc<KeyCache>,
        policy: Arc<dyn CredentialPolicy>,
        clock_skew: Duration,
    ) -> Self {
        Self {
            key_cache,
            policy,
            clock_skew,
        }
    }

    /// Verify a token and return its claims.
    ///
    /// # Checks
    ///
    /// 1. Empty input is `TokenMissing`
    /// 2. Size and header structure (`TokenMalformed`), no network call yet
    /// 3. `alg` must be RS256 (`SignatureInvalid` otherwise)
    /// 4. Signing key from the cache; fetch failures go to the credential policy
    /// 5. RS256 signature (`SignatureInvalid`), expiry (`TokenExpired`),
    ///    required `exp`/`iat` and `iat` skew (`ClaimInvalid`)
    /// 6. Non-empty `sub` (`ClaimMissingSubject`)
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let result = self.verify_inner(token).await;

        let outcome = match &result {
            Ok(claims) if claims.is_verified() => "verified",
            Ok(_) => "unverified_fallback",
            Err(e) => e.metric_outcome(),
        };
        record_token_verification(outcome);

        result
    }

    async fn verify_inner(&self, token: &str) -> Result<Claims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::TokenMissing);
        }

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "gw.auth.jwt", error = %e, "Token header rejected");
            TokenError::TokenMalformed
        })?;

        if header.alg != ACCEPTED_ALGORITHM {
            tracing::debug!(target: "gw.auth.jwt", alg = %header.alg, "Token declares unsupported algorithm");
            return Err(TokenError::SignatureInvalid);
        }

        let key = match self.key_cache.get_signing_key(header.kid.as_deref()).await {
            Ok(key) => key,
            Err(KeyFetchError::UnknownKeyId(kid)) => {
                // The key set was fetched; the token names a key we do not trust.
                tracing::debug!(target: "gw.auth.jwt", kid = %kid, "Token signed with unknown key");
                return Err(TokenError::SignatureInvalid);
            }
            Err(e) => {
                tracing::warn!(target: "gw.auth.jwt", error = %e, "Signing key unavailable");
                return self.policy.on_key_unavailable(token, &e);
            }
        };

        verify_with_key(token, &key, self.clock_skew)
    }
}

/// Verify signature and claims with a known key.
pub(crate) fn verify_with_key(
    token: &str,
    key: &DecodingKey,
    clock_skew: Duration,
) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);

    let token_data = decode::<TokenPayload>(token, key, &validation).map_err(|e| {
        tracing::debug!(target: "gw.auth.jwt", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::TokenExpired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat => TokenError::SignatureInvalid,
            // Claim checks run only after the signature verified.
            ErrorKind::MissingRequiredClaim(_) | ErrorKind::ImmatureSignature => {
                TokenError::ClaimInvalid
            }
            _ => TokenError::TokenMalformed,
        }
    })?;

    let payload = token_data.claims;

    let Some(iat) = payload.iat else {
        tracing::debug!(target: "gw.auth.jwt", "Token has no iat claim");
        return Err(TokenError::ClaimInvalid);
    };
    if let Err(e) = validate_iat(iat, clock_skew) {
        tracing::debug!(target: "gw.auth.jwt", error = %e, "Token iat validation failed");
        return Err(TokenError::ClaimInvalid);
    }

    let sub = payload
        .subject()
        .ok_or(TokenError::ClaimMissingSubject)?
        .to_string();

    tracing::debug!(target: "gw.auth.jwt", "Token verified");
    Ok(payload.into_claims(sub, ClaimsOrigin::Verified))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::policy::{DevelopmentPolicy, StrictPolicy};
    use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_JWT_SIZE_BYTES};
    use gw_test_utils::keys::{TestKeypair, TokenClaims};
    use gw_test_utils::mock_jwks;
    use wiremock::MockServer;

    fn primary_key() -> DecodingKey {
        let jwk = TestKeypair::primary().jwk_json();
        DecodingKey::from_rsa_components(
            jwk["n"].as_str().unwrap(),
            jwk["e"].as_str().unwrap(),
        )
        .unwrap()
    }

    async fn verifier_with_keys(
        server: &MockServer,
        policy: Arc<dyn CredentialPolicy>,
    ) -> TokenVerifier {
        mock_jwks::mount_keys(server, &[TestKeypair::primary()]).await;
        let cache = Arc::new(KeyCache::new(format!(
            "{}/.well-known/jwks.json",
            server.uri()
        )));
        TokenVerifier::new(cache, policy, DEFAULT_CLOCK_SKEW)
    }

    #[test]
    fn test_verify_with_key_valid_token() {
        let token = TestKeypair::primary().sign(&TokenClaims::valid("user-42"));

        let claims = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.email.as_deref(), Some("user-42@example.com"));
        assert!(claims.is_verified());
    }

    #[test]
    fn test_verify_with_key_wrong_signer() {
        let token = TestKeypair::rogue().sign(&TokenClaims::valid("user-42"));

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::SignatureInvalid);
    }

    #[test]
    fn test_verify_with_key_expired() {
        let token = TestKeypair::primary().sign(&TokenClaims::expired("user-42"));

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::TokenExpired);
    }

    #[test]
    fn test_verify_with_key_expired_and_forged_is_signature_invalid() {
        let token = TestKeypair::rogue().sign(&TokenClaims::expired("user-42"));

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::SignatureInvalid);
    }

    #[test]
    fn test_verify_with_key_missing_subject() {
        let mut claims = TokenClaims::valid("ignored");
        claims.sub = None;
        let token = TestKeypair::primary().sign(&claims);

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::ClaimMissingSubject);
    }

    #[test]
    fn test_verify_with_key_blank_subject() {
        let token = TestKeypair::primary().sign(&TokenClaims::valid(""));

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::ClaimMissingSubject);
    }

    #[test]
    fn test_verify_with_key_missing_exp() {
        let mut claims = TokenClaims::valid("user-42");
        claims.exp = None;
        let token = TestKeypair::primary().sign(&claims);

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::ClaimInvalid);
    }

    #[test]
    fn test_verify_with_key_missing_iat() {
        let mut claims = TokenClaims::valid("user-42");
        claims.iat = None;
        let token = TestKeypair::primary().sign(&claims);

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::ClaimInvalid);
    }

    #[test]
    fn test_verify_with_key_iat_in_future() {
        let mut claims = TokenClaims::valid("user-42");
        claims.iat = Some(chrono::Utc::now().timestamp() + 3600);
        claims.exp = Some(chrono::Utc::now().timestamp() + 7200);
        let token = TestKeypair::primary().sign(&claims);

        let result = verify_with_key(&token, &primary_key(), DEFAULT_CLOCK_SKEW);
        assert_eq!(result.unwrap_err(), TokenError::ClaimInvalid);
    }

    #[test]
    fn test_conclusive_classification() {
        assert!(TokenError::SignatureInvalid.is_conclusive());
        assert!(TokenError::TokenExpired.is_conclusive());
        assert!(TokenError::ClaimInvalid.is_conclusive());
        assert!(TokenError::ClaimMissingSubject.is_conclusive());
        assert!(!TokenError::TokenMalformed.is_conclusive());
        assert!(!TokenError::VerificationService(KeyFetchError::Timeout).is_conclusive());
    }

    #[tokio::test]
    async fn test_verify_empty_token_is_missing() {
        let server = MockServer::start().await;
        let verifier = verifier_with_keys(&server, Arc::new(StrictPolicy)).await;

        assert_eq!(verifier.verify("").await.unwrap_err(), TokenError::TokenMissing);
        assert_eq!(verifier.verify("   ").await.unwrap_err(), TokenError::TokenMissing);
    }

    #[tokio::test]
    async fn test_verify_round_trip() {
        let server = MockServer::start().await;
        let verifier = verifier_with_keys(&server, Arc::new(StrictPolicy)).await;

        let token = TestKeypair::primary().sign(&TokenClaims::valid("user-42"));
        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[tokio::test]
    async fn test_verify_token_without_kid_uses_first_key() {
        let server = MockServer::start().await;
        let verifier = verifier_with_keys(&server, Arc::new(StrictPolicy)).await;

        let token = TestKeypair::primary().sign_without_kid(&TokenClaims::valid("user-42"));
        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[tokio::test]
    async fn test_verify_unknown_kid_is_signature_invalid() {
        let server = MockServer::start().await;
        let verifier = verifier_with_keys(&server, Arc::new(DevelopmentPolicy)).await;

        // Rogue key carries its own kid, absent from the published set.
        let token = TestKeypair::rogue().sign(&TokenClaims::valid("user-42"));
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            TokenError::SignatureInvalid
        );
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_in_development_mode() {
        let server = MockServer::start().await;
        let verifier = verifier_with_keys(&server, Arc::new(DevelopmentPolicy)).await;

        let token = TestKeypair::rogue()
            .sign_with_kid(&TokenClaims::valid("user-42"), TestKeypair::PRIMARY_KID);
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            TokenError::SignatureInvalid
        );
    }

    #[tokio::test]
    async fn test_non_rs256_algorithm_is_signature_invalid_before_fetch() {
        let server = MockServer::start().await;
        // No key set mounted: any fetch would fail with a 404.
        let cache = Arc::new(KeyCache::new(format!(
            "{}/.well-known/jwks.json",
            server.uri()
        )));
        let verifier = TokenVerifier::new(cache, Arc::new(DevelopmentPolicy), DEFAULT_CLOCK_SKEW);

        let token = gw_test_utils::keys::sign_hs256(&TokenClaims::valid("user-42"), b"shared");
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            TokenError::SignatureInvalid
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_token_is_malformed() {
        let server = MockServer::start().await;
        let verifier = verifier_with_keys(&server, Arc::new(StrictPolicy)).await;

        let token = format!("eyJ{}", "a".repeat(MAX_JWT_SIZE_BYTES));
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            TokenError::TokenMalformed
        );
    }

    #[tokio::test]
    async fn test_key_fetch_failure_strict_is_service_error() {
        let server = MockServer::start().await;
        mock_jwks::mount_status(&server, 503).await;
        let cache = Arc::new(KeyCache::new(format!(
            "{}/.well-known/jwks.json",
            server.uri()
        )));
        let verifier = TokenVerifier::new(cache, Arc::new(StrictPolicy), DEFAULT_CLOCK_SKEW);

        let token = TestKeypair::primary().sign(&TokenClaims::valid("user-42"));
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            TokenError::VerificationService(KeyFetchError::Status(503))
        );
    }

    #[tokio::test]
    async fn test_key_fetch_failure_development_decodes_unverified() {
        let server = MockServer::start().await;
        mock_jwks::mount_status(&server, 503).await;
        let cache = Arc::new(KeyCache::new(format!(
            "{}/.well-known/jwks.json",
            server.uri()
        )));
        let verifier = TokenVerifier::new(cache, Arc::new(DevelopmentPolicy), DEFAULT_CLOCK_SKEW);

        let token = TestKeypair::rogue().sign(&TokenClaims::valid("user-42"));
        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.sub, "user-42");
        assert!(!claims.is_verified());
    }
}
