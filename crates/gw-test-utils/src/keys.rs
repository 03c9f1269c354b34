//! Test signing keys and token builders.
//!
//! Two fixed RSA-2048 keypairs: `primary` is the key a mock key-set endpoint
//! publishes, `rogue` is never published and stands in for a forger.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};

const PRIMARY_PEM: &[u8] = include_bytes!("../keys/primary_rsa.pem");
const ROGUE_PEM: &[u8] = include_bytes!("../keys/rogue_rsa.pem");

const PRIMARY_N: &str = "pCjSqeSTztTTjOJoM8ZTNP7hflgd3PKaOHdhptKqjebnP_H_a-KirK-qrWY0Ij9LAR201Kwq8Qf0lwals6skSq8DaLtG1RGIlOTgq6Y8kLdolfeG-PbJvxtCbThHWDdrA2jEI8xf9eEnv0L0kMdfYVk-OCCr8Oetxw3fZ_ftGOXJsliHNGvFB0dfPk-jSon4JXUThsaqEWKsDX3LsLuQIN4HsCkpA6HG_XcCYSO8g1vAfCY2eQDhAU3qriz56TOzlse6uyl8SUXptbnK9c0-QuUcxatvt48JuSeN5CmdAa1oh2d6uiVSd66hNwaHCDRJN-H4ewrnXYMJasPjVG5sGw";
const ROGUE_N: &str = "r6YxXHTemScKLjsTF1YYzRJqAVBOWWu3jG8MJpNbCtzFc1wetvUKCrmt82X2I-ryOwFVcctcDFZ1_0TjRoLjWnc3ngB1mvh9asCvpz3Cl-cQAKsbdfaaPjc1UDzSaOdaXpzQm7hWIlrv6z-Q7QH9NDyx3IDSBlPrD-BeBuqqqAewJjROUiHlUJCICunL2dNWcq0Swj8SbmB4aS5o0y1S_nHhMwiWzyZ4FLuB6DyNcOIPliYaYJ_IUoKQsXg9SN4azwzwIRVahmXPk62sZ-FLS7t4kgIgttAL0MHAGc6cYSwtbrg6K9N_IqNdq8jRiBe3RAWF2hxYrNlcph_DPrS6ow";
const EXPONENT: &str = "AQAB";

/// An RSA keypair with its published JWK components.
#[derive(Clone)]
pub struct TestKeypair {
    kid: &'static str,
    encoding_key: EncodingKey,
    n: &'static str,
}

impl TestKeypair {
    pub const PRIMARY_KID: &'static str = "gw-test-primary";
    pub const ROGUE_KID: &'static str = "gw-test-rogue";

    /// The key published by mock key-set endpoints.
    pub fn primary() -> Self {
        Self {
            kid: Self::PRIMARY_KID,
            encoding_key: EncodingKey::from_rsa_pem(PRIMARY_PEM).expect("primary test key"),
            n: PRIMARY_N,
        }
    }

    /// A key nobody publishes.
    pub fn rogue() -> Self {
        Self {
            kid: Self::ROGUE_KID,
            encoding_key: EncodingKey::from_rsa_pem(ROGUE_PEM).expect("rogue test key"),
            n: ROGUE_N,
        }
    }

    pub fn kid(&self) -> &'static str {
        self.kid
    }

    /// Sign RS256 with this key's own `kid`.
    pub fn sign<T: Serialize>(&self, claims: &T) -> String {
        self.sign_with_kid(claims, self.kid)
    }

    /// Sign RS256 claiming an arbitrary `kid`.
    pub fn sign_with_kid<T: Serialize>(&self, claims: &T, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).expect("sign test token")
    }

    /// Sign RS256 with no `kid` in the header.
    pub fn sign_without_kid<T: Serialize>(&self, claims: &T) -> String {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key)
            .expect("sign test token")
    }

    /// JWK entry as published in a key set.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "alg": "RS256",
            "use": "sig",
            "n": self.n,
            "e": EXPONENT,
        })
    }
}

/// Claims shaped like the identity provider's access tokens.
///
/// Every field is optional so tests can drop any of them.
#[derive(Debug, Clone, Serialize)]
pub struct TokenClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Issued now, valid for an hour.
    pub fn valid(sub: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: Some(sub.to_string()),
            email: Some(format!("{sub}@example.com")),
            phone: None,
            role: Some("authenticated".to_string()),
            exp: Some(now + 3600),
            iat: Some(now),
        }
    }

    /// Issued two hours ago, expired one hour ago.
    pub fn expired(sub: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            exp: Some(now - 3600),
            iat: Some(now - 7200),
            ..Self::valid(sub)
        }
    }
}

/// HS256 token, for algorithm-confusion tests.
pub fn sign_hs256<T: Serialize>(claims: &T, secret: &[u8]) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .expect("sign HS256 test token")
}

/// `alg: none` token with an empty signature segment.
pub fn unsigned_token<T: Serialize>(claims: &T) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("serialize claims"));
    format!("{header}.{payload}.")
}
