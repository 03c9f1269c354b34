//! Mock key-set endpoints on `wiremock` servers.
//!
//! All mounts answer `GET /.well-known/jwks.json`.

use crate::keys::TestKeypair;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Key-set document publishing `keys`.
pub fn key_set(keys: &[TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(TestKeypair::jwk_json).collect::<Vec<_>>() })
}

/// Key-set URL on `server`.
pub fn jwks_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), JWKS_PATH)
}

/// Serve a key set publishing `keys`.
pub async fn mount_keys(server: &MockServer, keys: &[TestKeypair]) {
    mount_json(server, key_set(keys)).await;
}

/// Serve an arbitrary JSON document.
pub async fn mount_json(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Answer with a bare status code.
pub async fn mount_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve a key set after `delay`, for timeout tests.
pub async fn mount_delayed(server: &MockServer, keys: &[TestKeypair], delay: Duration) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(key_set(keys))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}
