//! Password recovery client for the identity provider.
//!
//! The forgot-password handler only needs "ask the provider to send a reset
//! email". Outcomes are reported as [`RecoveryError`] for logging; the
//! handler never surfaces them to the caller.

use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Default timeout for recovery requests.
const RECOVERY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Recovery endpoint path on the identity provider.
const RECOVER_PATH: &str = "/auth/v1/recover";

/// Frontend path the reset email links to.
const RESET_PASSWORD_PATH: &str = "/reset-password";

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("Identity provider returned status {0}")]
    Rejected(u16),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Requests password-reset emails.
#[async_trait::async_trait]
pub trait PasswordRecovery: Send + Sync {
    async fn send_reset_email(&self, email: &str) -> Result<(), RecoveryError>;
}

#[derive(Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
    redirect_to: String,
}

/// Recovery client calling the identity provider over HTTP.
pub struct HttpPasswordRecovery {
    client: Client,
    recover_url: String,
    redirect_to: String,
    api_key: Option<SecretString>,
}

impl HttpPasswordRecovery {
    /// Create a client for `{auth_provider_url}/auth/v1/recover`, redirecting
    /// reset links to `{frontend_url}/reset-password`.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::Client` if the HTTP client cannot be built.
    pub fn new(
        auth_provider_url: &str,
        frontend_url: &str,
        api_key: Option<SecretString>,
    ) -> Result<Self, RecoveryError> {
        let client = Client::builder()
            .timeout(RECOVERY_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RecoveryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            recover_url: format!("{auth_provider_url}{RECOVER_PATH}"),
            redirect_to: format!("{frontend_url}{RESET_PASSWORD_PATH}"),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl PasswordRecovery for HttpPasswordRecovery {
    #[instrument(skip_all)]
    async fn send_reset_email(&self, email: &str) -> Result<(), RecoveryError> {
        let mut request = self.client.post(&self.recover_url).json(&RecoverRequest {
            email,
            redirect_to: self.redirect_to.clone(),
        });

        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(target: "gw.services.password_recovery", error = %e, "Recovery request failed");
            RecoveryError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "gw.services.password_recovery",
                status = status.as_u16(),
                "Identity provider rejected recovery request"
            );
            return Err(RecoveryError::Rejected(status.as_u16()));
        }

        Ok(())
    }
}

/// Mock recovery client for testing.
pub mod mock {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    /// Records every address and optionally fails.
    #[derive(Default)]
    pub struct MockPasswordRecovery {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockPasswordRecovery {
        pub fn succeeding() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        /// Addresses passed to `send_reset_email`, in call order.
        pub fn sent(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait::async_trait]
    impl PasswordRecovery for MockPasswordRecovery {
        async fn send_reset_email(&self, email: &str) -> Result<(), RecoveryError> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(email.to_string());

            if self.fail {
                return Err(RecoveryError::Rejected(500));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_posts_email_and_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/recover"))
            .and(header("apikey", "anon-key"))
            .and(body_json(serde_json::json!({
                "email": "someone@example.com",
                "redirect_to": "http://localhost:5173/reset-password",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpPasswordRecovery::new(
            &server.uri(),
            "http://localhost:5173",
            Some(SecretString::from("anon-key")),
        )
        .unwrap();

        client.send_reset_email("someone@example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/recover"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpPasswordRecovery::new(&server.uri(), "http://localhost:5173", None).unwrap();
        let err = client.send_reset_email("someone@example.com").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Rejected(429)));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let client =
            HttpPasswordRecovery::new("http://127.0.0.1:9", "http://localhost:5173", None).unwrap();
        let err = client.send_reset_email("someone@example.com").await.unwrap_err();
        assert!(matches!(err, RecoveryError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = mock::MockPasswordRecovery::failing();
        assert!(mock.send_reset_email("a@example.com").await.is_err());
        assert_eq!(mock.sent(), vec!["a@example.com".to_string()]);
    }
}
