//! Service layer for the gateway.
//!
//! # Components
//!
//! - `rate_limiter` - Sliding-window per-client admission control
//! - `password_recovery` - Identity provider client for reset emails

pub mod password_recovery;
pub mod rate_limiter;

pub use password_recovery::{HttpPasswordRecovery, PasswordRecovery, RecoveryError};
pub use rate_limiter::{Decision, RateLimiter};
