//! Signing key cache.
//!
//! Fetches the identity provider's JSON Web Key Set and caches the decoded
//! RSA verification keys until a fixed expiry. The set is refetched lazily,
//! on the first lookup after expiry, and the caller waits for the refetch.
//! There is no stale-key grace period.
//!
//! Two requests observing an expired cache at the same time both fetch; the
//! last write wins. Fetches are idempotent so this only costs a request.

use crate::observability::metrics::record_jwks_fetch;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Default cache TTL (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from obtaining a signing key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyFetchError {
    #[error("key set endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("key set fetch timed out")]
    Timeout,

    #[error("key set endpoint returned status {0}")]
    Status(u16),

    #[error("key set document is malformed: {0}")]
    MalformedKeySet(String),

    #[error("key set contains no usable signing key")]
    NoUsableKey,

    #[error("unsupported key algorithm: {0}")]
    UnsupportedKeyAlgorithm(String),

    #[error("no signing key with id '{0}'")]
    UnknownKeyId(String),
}

impl KeyFetchError {
    /// Whether a retry later could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KeyFetchError::Unreachable(_) | KeyFetchError::Timeout | KeyFetchError::Status(_)
        )
    }

    fn metric_status(&self) -> &'static str {
        match self {
            KeyFetchError::Unreachable(_) => "unreachable",
            KeyFetchError::Timeout => "timeout",
            KeyFetchError::Status(_) => "http_error",
            KeyFetchError::MalformedKeySet(_) => "malformed",
            KeyFetchError::NoUsableKey
            | KeyFetchError::UnsupportedKeyAlgorithm(_)
            | KeyFetchError::UnknownKeyId(_) => "no_usable_key",
        }
    }
}

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" is the only type accepted).
    pub kty: String,

    /// Key ID.
    #[serde(default)]
    pub kid: Option<String>,

    /// Declared algorithm, if any.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signing keys).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// Key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// One entry of the decoded key set.
#[derive(Clone)]
enum CachedKey {
    Rsa(Arc<DecodingKey>),
    Unsupported(String),
}

/// Decoded key set with expiry.
struct KeySet {
    by_kid: HashMap<String, CachedKey>,

    /// First usable key in document order, used for tokens without `kid`.
    default_key: Arc<DecodingKey>,

    expires_at: Instant,
}

impl KeySet {
    fn lookup(&self, kid: Option<&str>) -> Result<Arc<DecodingKey>, KeyFetchError> {
        let Some(kid) = kid else {
            return Ok(Arc::clone(&self.default_key));
        };

        match self.by_kid.get(kid) {
            Some(CachedKey::Rsa(key)) => Ok(Arc::clone(key)),
            Some(CachedKey::Unsupported(alg)) => {
                Err(KeyFetchError::UnsupportedKeyAlgorithm(alg.clone()))
            }
            None => Err(KeyFetchError::UnknownKeyId(kid.to_string())),
        }
    }

    fn usable_count(&self) -> usize {
        self.by_kid
            .values()
            .filter(|k| matches!(k, CachedKey::Rsa(_)))
            .count()
    }
}

/// Classify one JWK. Returns `Err(description)` for keys that cannot verify RS256.
fn decode_jwk(jwk: &Jwk) -> Result<DecodingKey, String> {
    if jwk.kty != "RSA" {
        return Err(jwk.kty.clone());
    }
    if let Some(alg) = jwk.alg.as_deref() {
        if alg != "RS256" {
            return Err(alg.to_string());
        }
    }
    if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
        return Err(format!("RSA (use={})", jwk.key_use.as_deref().unwrap_or("")));
    }

    match (jwk.n.as_deref(), jwk.e.as_deref()) {
        (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e)
            .map_err(|err| format!("RSA (invalid components: {err})")),
        _ => Err("RSA (missing modulus or exponent)".to_string()),
    }
}

/// Build the cached key set from a fetched document.
fn build_key_set(jwks: JwkSet, ttl: Duration) -> Result<KeySet, KeyFetchError> {
    let mut by_kid = HashMap::new();
    let mut default_key = None;

    for jwk in &jwks.keys {
        let entry = match decode_jwk(jwk) {
            Ok(key) => {
                let key = Arc::new(key);
                if default_key.is_none() {
                    default_key = Some(Arc::clone(&key));
                }
                CachedKey::Rsa(key)
            }
            Err(description) => {
                tracing::warn!(
                    target: "gw.auth.jwks",
                    kid = ?jwk.kid,
                    key_type = %description,
                    "Ignoring unusable key in key set"
                );
                CachedKey::Unsupported(description)
            }
        };

        if let Some(kid) = jwk.kid.as_deref().filter(|k| !k.is_empty()) {
            by_kid.insert(kid.to_string(), entry);
        }
    }

    let default_key = default_key.ok_or(KeyFetchError::NoUsableKey)?;

    Ok(KeySet {
        by_kid,
        default_key,
        expires_at: Instant::now() + ttl,
    })
}

/// Process-wide cache of the identity provider's signing keys.
pub struct KeyCache {
    jwks_url: String,
    http_client: reqwest::Client,
    cache: RwLock<Option<Arc<KeySet>>>,
    cache_ttl: Duration,
}

impl KeyCache {
    /// Create a key cache with the default TTL and fetch timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_settings(jwks_url, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a key cache with explicit TTL and fetch timeout.
    pub fn with_settings(jwks_url: String, cache_ttl: Duration, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            cache_ttl,
        }
    }

    /// Get the verification key for a token.
    ///
    /// With `Some(kid)` the key carrying that id is returned. With `None` the
    /// first usable key of the set is returned. An expired or empty cache is
    /// refreshed before the lookup.
    ///
    /// # Errors
    ///
    /// - Fetch failures (`Unreachable`, `Timeout`, `Status`, `MalformedKeySet`, `NoUsableKey`)
    /// - `UnsupportedKeyAlgorithm` when `kid` names a non-RSA key
    /// - `UnknownKeyId` when `kid` is not in a freshly valid set
    #[instrument(skip_all, fields(kid = ?kid))]
    pub async fn get_signing_key(
        &self,
        kid: Option<&str>,
    ) -> Result<Arc<DecodingKey>, KeyFetchError> {
        {
            let cache = self.cache.read().await;
            if let Some(key_set) = cache.as_ref() {
                if key_set.expires_at > Instant::now() {
                    tracing::debug!(target: "gw.auth.jwks", "Key cache hit");
                    return key_set.lookup(kid);
                }
            }
        }

        let key_set = self.refresh().await?;
        key_set.lookup(kid)
    }

    /// Ensure a usable key set can be obtained (readiness probe).
    pub async fn check_available(&self) -> Result<(), KeyFetchError> {
        self.get_signing_key(None).await.map(|_| ())
    }

    /// Fetch the key set and replace the cached copy.
    #[instrument(skip(self))]
    async fn refresh(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let start = Instant::now();
        let result = self.fetch().await;
        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.metric_status(),
        };
        record_jwks_fetch(status, start.elapsed());

        let key_set = Arc::new(result?);

        tracing::info!(
            target: "gw.auth.jwks",
            key_count = key_set.usable_count(),
            "Key cache refreshed"
        );

        let mut cache = self.cache.write().await;
        *cache = Some(Arc::clone(&key_set));

        Ok(key_set)
    }

    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        tracing::debug!(target: "gw.auth.jwks", url = %self.jwks_url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gw.auth.jwks",
                status = %response.status(),
                "Key set endpoint returned error"
            );
            return Err(KeyFetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(|e| map_transport_error(&e))?;

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to parse key set");
            KeyFetchError::MalformedKeySet(e.to_string())
        })?;

        build_key_set(jwks, self.cache_ttl).inspect_err(|_| {
            tracing::error!(target: "gw.auth.jwks", "Key set contains no usable signing key");
        })
    }

    /// Drop the cached key set.
    #[cfg(test)]
    pub async fn clear(&self) {
        *self.cache.write().await = None;
    }
}

fn map_transport_error(e: &reqwest::Error) -> KeyFetchError {
    if e.is_timeout() {
        tracing::error!(target: "gw.auth.jwks", error = %e, "Key set fetch timed out");
        KeyFetchError::Timeout
    } else {
        tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to fetch key set");
        KeyFetchError::Unreachable(e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use gw_test_utils::keys::TestKeypair;
    use gw_test_utils::mock_jwks;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn jwks_url(server: &MockServer) -> String {
        format!("{}/.well-known/jwks.json", server.uri())
    }

    #[test]
    fn test_jwk_deserialization() {
        let json = r#"{
            "kty": "RSA",
            "kid": "key-1",
            "alg": "RS256",
            "use": "sig",
            "n": "AQAB",
            "e": "AQAB"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("key-1"));
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "EC"}"#).unwrap();
        assert_eq!(jwk.kty, "EC");
        assert!(jwk.kid.is_none());
        assert!(jwk.n.is_none());
    }

    #[test]
    fn test_transient_classification() {
        assert!(KeyFetchError::Timeout.is_transient());
        assert!(KeyFetchError::Unreachable("refused".into()).is_transient());
        assert!(KeyFetchError::Status(502).is_transient());
        assert!(!KeyFetchError::MalformedKeySet("eof".into()).is_transient());
        assert!(!KeyFetchError::NoUsableKey.is_transient());
        assert!(!KeyFetchError::UnsupportedKeyAlgorithm("EC".into()).is_transient());
    }

    #[test]
    fn test_build_key_set_rejects_set_without_rsa_keys() {
        let jwks: JwkSet =
            serde_json::from_str(r#"{"keys":[{"kty":"EC","kid":"ec-1","crv":"P-256"}]}"#)
                .unwrap();
        let result = build_key_set(jwks, DEFAULT_CACHE_TTL);
        assert!(matches!(result, Err(KeyFetchError::NoUsableKey)));
    }

    #[test]
    fn test_build_key_set_rejects_empty_set() {
        let jwks: JwkSet = serde_json::from_str(r#"{"keys":[]}"#).unwrap();
        assert!(matches!(
            build_key_set(jwks, DEFAULT_CACHE_TTL),
            Err(KeyFetchError::NoUsableKey)
        ));
    }

    #[tokio::test]
    async fn test_fetches_key_by_kid() {
        let server = MockServer::start().await;
        mock_jwks::mount_keys(&server, &[TestKeypair::primary()]).await;

        let cache = KeyCache::new(jwks_url(&server));
        let key = cache.get_signing_key(Some(TestKeypair::PRIMARY_KID)).await;
        assert!(key.is_ok());
    }

    #[tokio::test]
    async fn test_without_kid_returns_first_usable_key() {
        let server = MockServer::start().await;
        mock_jwks::mount_json(
            &server,
            serde_json::json!({
                "keys": [
                    {"kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "x", "y": "y"},
                    TestKeypair::primary().jwk_json()
                ]
            }),
        )
        .await;

        let cache = KeyCache::new(jwks_url(&server));
        assert!(cache.get_signing_key(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_kid_in_fresh_cache_does_not_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_jwks::key_set(&[TestKeypair::primary()])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = KeyCache::new(jwks_url(&server));
        cache
            .get_signing_key(Some(TestKeypair::PRIMARY_KID))
            .await
            .unwrap();

        let result = cache.get_signing_key(Some("rotated-key")).await;
        assert!(matches!(result, Err(KeyFetchError::UnknownKeyId(kid)) if kid == "rotated-key"));
        // MockServer verifies `expect(1)` on drop
    }

    #[tokio::test]
    async fn test_kid_naming_non_rsa_key_is_unsupported() {
        let server = MockServer::start().await;
        mock_jwks::mount_json(
            &server,
            serde_json::json!({
                "keys": [
                    TestKeypair::primary().jwk_json(),
                    {"kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "x", "y": "y"}
                ]
            }),
        )
        .await;

        let cache = KeyCache::new(jwks_url(&server));
        let result = cache.get_signing_key(Some("ec-1")).await;
        assert!(matches!(result, Err(KeyFetchError::UnsupportedKeyAlgorithm(alg)) if alg == "EC"));
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let server = MockServer::start().await;
        mock_jwks::mount_status(&server, 500).await;

        let cache = KeyCache::new(jwks_url(&server));
        let result = cache.get_signing_key(None).await;
        assert_eq!(result.err(), Some(KeyFetchError::Status(500)));
    }

    #[tokio::test]
    async fn test_malformed_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let cache = KeyCache::new(jwks_url(&server));
        let result = cache.get_signing_key(None).await;
        assert!(matches!(result, Err(KeyFetchError::MalformedKeySet(_))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        mock_jwks::mount_delayed(&server, &[TestKeypair::primary()], Duration::from_secs(2)).await;

        let cache = KeyCache::with_settings(
            jwks_url(&server),
            DEFAULT_CACHE_TTL,
            Duration::from_millis(200),
        );
        let result = cache.get_signing_key(None).await;
        assert_eq!(result.err(), Some(KeyFetchError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Nothing listens on port 1
        let cache = KeyCache::with_settings(
            "http://127.0.0.1:1/.well-known/jwks.json".to_string(),
            DEFAULT_CACHE_TTL,
            Duration::from_secs(2),
        );
        let result = cache.get_signing_key(None).await;
        assert!(matches!(
            result,
            Err(KeyFetchError::Unreachable(_)) | Err(KeyFetchError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_jwks::key_set(&[TestKeypair::primary()])),
            )
            .expect(2)
            .mount(&server)
            .await;

        let cache = KeyCache::with_settings(
            jwks_url(&server),
            Duration::from_millis(50),
            DEFAULT_FETCH_TIMEOUT,
        );
        cache.get_signing_key(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.get_signing_key(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_jwks::key_set(&[TestKeypair::primary()])),
            )
            .expect(2)
            .mount(&server)
            .await;

        let cache = KeyCache::new(jwks_url(&server));
        cache.check_available().await.unwrap();
        cache.clear().await;
        cache.check_available().await.unwrap();
    }
}
