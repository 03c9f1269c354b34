//! HTTP routes for the API gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{policy_for, IdentityResolver, KeyCache, TokenVerifier};
use crate::config::Config;
use crate::errors::GatewayError;
use crate::handlers;
use crate::middleware::{
    http_metrics_middleware, panic_response, rate_limit, request_context, require_identity,
    AuthState, RateLimitState,
};
use crate::services::{HttpPasswordRecovery, PasswordRecovery, RateLimiter};
use axum::{
    error_handling::HandleErrorLayer,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

/// Application state shared across all handlers.
///
/// Every field is process-scoped: built once at startup and dropped at
/// shutdown.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Signing key cache, shared with the token verifier.
    pub key_cache: Arc<KeyCache>,

    /// Caller identity resolution for protected routes.
    pub resolver: Arc<IdentityResolver>,

    /// Per-client admission control.
    pub rate_limiter: Arc<RateLimiter>,

    /// Identity provider client for reset emails.
    pub password_recovery: Arc<dyn PasswordRecovery>,
}

impl AppState {
    /// Build the process-scoped components from configuration.
    ///
    /// The development flag is consumed here and nowhere else.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if an HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self, GatewayError> {
        let key_cache = Arc::new(KeyCache::with_settings(
            config.jwks_url.clone(),
            Duration::from_secs(config.jwks_cache_ttl_seconds),
            Duration::from_secs(config.jwks_fetch_timeout_seconds),
        ));

        let policy = policy_for(config.dev_mode);
        let verifier = Arc::new(TokenVerifier::new(
            Arc::clone(&key_cache),
            Arc::clone(&policy),
            config.clock_skew(),
        ));
        let resolver = Arc::new(IdentityResolver::new(verifier, policy));

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_rpm,
            Duration::from_secs(config.rate_limit_sweep_interval_seconds),
        ));

        let password_recovery = HttpPasswordRecovery::new(
            &config.auth_provider_url,
            &config.frontend_url,
            config.auth_provider_api_key.clone(),
        )
        .map_err(|e| GatewayError::Internal(format!("password recovery client: {e}")))?;

        Ok(Self {
            config,
            key_cache,
            resolver,
            rate_limiter,
            password_recovery: Arc::new(password_recovery),
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/ready` - Readiness probe (key set reachable) - public
/// - `/metrics` - Prometheus metrics - public
/// - `/api/v1/auth/forgot-password` - Password reset request - public
/// - `/api/v1/users/me` - Current caller - requires identity
///
/// Every route, including 404s, passes through request correlation, HTTP
/// metrics and rate limiting. Unknown paths, unsupported methods and timeouts
/// answer with the standard error body.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        resolver: Arc::clone(&state.resolver),
    });
    let rate_limit_state = RateLimitState::new(Arc::clone(&state.rate_limiter));
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(
            "/api/v1/auth/forgot-password",
            post(handlers::forgot_password),
        )
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (identity required)
    let protected_routes = Router::new()
        .route("/api/v1/users/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(auth_state, require_identity))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. Timeout (innermost) - elapsed requests become REQUEST_TIMEOUT
    // 2. TraceLayer
    // 3. CatchPanicLayer - panics become generic 500s
    // 4. CorsLayer
    // 5. rate_limit - rejects before any handler or identity work
    // 6. http_metrics_middleware - records every response, 429s included
    // 7. request_context (outermost) - correlation id for everything inside
    let routes = public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found);

    with_request_timeout(routes, request_timeout)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit))
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_context))
}

/// Bound handler time; an elapsed request answers `REQUEST_TIMEOUT`.
fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handlers::handle_middleware_error))
            .timeout(timeout),
    )
}
