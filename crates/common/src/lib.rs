//! Utilities shared across the gateway crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT inspection utilities (size limits, header/payload decoding, iat checks)
pub mod jwt;
