//! Secret types for keeping credentials out of logs.
//!
//! Re-exports the [`secrecy`] types the gateway uses for the identity provider
//! API key and any other credential that passes through configuration.
//! `SecretString` redacts itself in `Debug`, so a struct deriving `Debug` that
//! holds one can be logged safely. The value is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ProviderCredentials {
//!     base_url: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = ProviderCredentials {
//!     base_url: "https://idp.example.com".to_string(),
//!     api_key: SecretString::from("anon-key"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("anon-key"));
//! assert_eq!(creds.api_key.expose_secret(), "anon-key");
//! ```
//!
//! Use `SecretString` for provider API keys and bearer tokens that must be
//! stored.

pub use secrecy::{ExposeSecret, SecretString};
