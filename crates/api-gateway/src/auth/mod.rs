//! Caller authentication.
//!
//! # Components
//!
//! - `jwks` - Signing key cache for the identity provider's key set
//! - `jwt` - Token verification against cached keys
//! - `claims` - Claims carried by access tokens
//! - `policy` - Strict/development credential policy, chosen once at startup
//! - `identity` - Identity resolution from the `Authorization` header

pub mod claims;
pub mod identity;
pub mod jwks;
pub mod jwt;
pub mod policy;

pub use claims::Claims;
pub use identity::{AuthError, Identity, IdentityResolver, IdentitySource};
pub use jwks::{KeyCache, KeyFetchError};
pub use jwt::{TokenError, TokenVerifier};
pub use policy::{policy_for, CredentialPolicy, DevelopmentPolicy, StrictPolicy};
