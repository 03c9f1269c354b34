//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use api_gateway::config::Config;
use api_gateway::observability::metrics::init_metrics_recorder;
use api_gateway::routes::{self, AppState};
use api_gateway::services::password_recovery::mock::MockPasswordRecovery;
use api_gateway::services::PasswordRecovery;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// The global recorder can only be installed once per process.
fn metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Knobs for a test server.
#[derive(Clone)]
pub struct TestServerOptions {
    /// Key-set endpoint, usually `mock_jwks::jwks_url(&mock_server)`.
    pub jwks_url: String,
    pub dev_mode: bool,
    pub rate_limit_rpm: u32,
    pub jwks_fetch_timeout_seconds: u64,
    /// Defaults to a succeeding mock.
    pub password_recovery: Option<Arc<dyn PasswordRecovery>>,
}

impl TestServerOptions {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            dev_mode: false,
            rate_limit_rpm: 1000,
            jwks_fetch_timeout_seconds: 10,
            password_recovery: None,
        }
    }

    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn rate_limit_rpm(mut self, rpm: u32) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }

    pub fn jwks_fetch_timeout_seconds(mut self, seconds: u64) -> Self {
        self.jwks_fetch_timeout_seconds = seconds;
        self
    }

    pub fn password_recovery(mut self, recovery: Arc<dyn PasswordRecovery>) -> Self {
        self.password_recovery = Some(recovery);
        self
    }
}

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockServer::start().await;
/// mock_jwks::mount_keys(&jwks, &[TestKeypair::primary()]).await;
///
/// let server = TestGatewayServer::spawn(TestServerOptions::new(mock_jwks::jwks_url(&jwks))).await?;
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway on `127.0.0.1:0` using the real router.
    pub async fn spawn(options: TestServerOptions) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "AUTH_PROVIDER_URL".to_string(),
                "http://127.0.0.1:9".to_string(),
            ),
            ("AUTH_JWKS_URL".to_string(), options.jwks_url.clone()),
            ("DEV_MODE".to_string(), options.dev_mode.to_string()),
            (
                "RATE_LIMIT_RPM".to_string(),
                options.rate_limit_rpm.to_string(),
            ),
            (
                "JWKS_FETCH_TIMEOUT_SECONDS".to_string(),
                options.jwks_fetch_timeout_seconds.to_string(),
            ),
            ("DRAIN_SECONDS".to_string(), "0".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let mut state = AppState::from_config(config.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build state: {}", e))?;
        state.password_recovery = options
            .password_recovery
            .unwrap_or_else(|| Arc::new(MockPasswordRecovery::succeeding()));
        let state = Arc::new(state);

        let app = routes::build_routes(Arc::clone(&state), metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            // Peer addresses key the rate limiter
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared state, for inspecting the key cache or rate limiter.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
