//! JWT inspection utilities shared by the gateway crates.
//!
//! This module provides the pieces of JWT handling that do not need a key:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Header decoding (`alg`, `kid`) used to pick a verification key
//! - Unverified payload decoding, used only by the development credential policy
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature. A decoded header or payload
//!   is untrusted input until the token has been verified with a signing key.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_header(token)?;
//! let key = key_cache.get_signing_key(header.kid.as_deref()).await?;
//! // ... verify signature with `key` ...
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Identity-provider access tokens are typically under
/// 1.5KB even with user metadata embedded.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT without a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("Token exceeds maximum size")]
    TokenTooLarge,

    /// Token format is invalid (structure, base64, or JSON).
    #[error("Token is malformed")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("Token issued-at is in the future")]
    IatTooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// The JOSE header fields the gateway cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm declared by the token (e.g. `RS256`).
    pub alg: String,

    /// Key ID used to select the verification key, if present.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments after the size check.
fn split_segments(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode one base64url segment as JSON.
fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtValidationError::MalformedToken
    })
}

/// Decode the JWT header without verifying the signature.
///
/// An empty `kid` is normalized to `None`.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong number of segments, bad base64, or invalid header JSON
pub fn decode_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    let (header_part, _, _) = split_segments(token)?;
    let mut header: TokenHeader = decode_segment(header_part)?;

    if header.kid.as_deref().is_some_and(str::is_empty) {
        header.kid = None;
    }

    Ok(header)
}

/// Decode the JWT payload WITHOUT verifying the signature.
///
/// The result is attacker-controlled data. Only the development credential
/// policy may act on it.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong number of segments, bad base64, or payload JSON
///   that does not match `T`
pub fn decode_payload_unverified<T: DeserializeOwned>(token: &str) -> Result<T, JwtValidationError> {
    let (header_part, payload_part, _) = split_segments(token)?;
    // A token whose header is not valid JSON is not a JWT at all.
    let _: serde_json::Value = decode_segment(header_part)?;
    decode_segment(payload_part)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
