//! API Gateway Library
//!
//! Request-authentication and traffic-control core for the platform's REST
//! gateway. Every inbound request passes through:
//!
//! ```text
//! request_context -> rate_limit -> [require_identity] -> handler
//! ```
//!
//! - Correlation ids on every response and error body
//! - Per-client sliding-window rate limiting with periodic reclamation
//! - Bearer token verification against the identity provider's key set
//! - A credential policy that confines development-mode relaxations
//!
//! # Modules
//!
//! - `auth` - Key cache, token verifier, identity resolver, credential policy
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Request context, metrics, rate limiting, authentication
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Rate limiter and identity provider client
//! - `tasks` - Background tasks

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod services;
pub mod tasks;
