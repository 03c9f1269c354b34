//! # Gateway Test Utilities
//!
//! Shared test utilities for the API gateway.
//!
//! This crate provides:
//! - Fixed RSA test keypairs and token builders (`keys`)
//! - Mock key-set endpoints on `wiremock` servers (`mock_jwks`)
//! - Server test harness (`TestGatewayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gw_test_utils::keys::{TestKeypair, TokenClaims};
//! use gw_test_utils::{mock_jwks, TestGatewayServer, TestServerOptions};
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let jwks = wiremock::MockServer::start().await;
//!     mock_jwks::mount_keys(&jwks, &[TestKeypair::primary()]).await;
//!     let server = TestGatewayServer::spawn(TestServerOptions::new(mock_jwks::jwks_url(&jwks))).await?;
//!
//!     let token = TestKeypair::primary().sign(&TokenClaims::valid("user-42"));
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/users/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod mock_jwks;
pub mod server_harness;

pub use server_harness::*;
