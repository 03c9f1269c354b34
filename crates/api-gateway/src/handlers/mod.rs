//! HTTP request handlers for the gateway.

pub mod auth;
pub mod fallback;
pub mod health;
pub mod me;
pub mod metrics;

pub use auth::forgot_password;
pub use fallback::{handle_middleware_error, method_not_allowed, not_found};
pub use health::{health_check, readiness_check};
pub use me::get_me;
pub use metrics::metrics_handler;
