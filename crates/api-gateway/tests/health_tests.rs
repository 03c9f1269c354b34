//! Operational endpoint and request pipeline integration tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use gw_test_utils::keys::TestKeypair;
use gw_test_utils::{mock_jwks, TestGatewayServer, TestServerOptions};
use wiremock::MockServer;

/// Test that /health is public and reports the service.
#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let server = TestGatewayServer::spawn(TestServerOptions::new("http://127.0.0.1:9/jwks")).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "api-gateway");
    assert!(body["version"].is_string());

    Ok(())
}

/// Test that /ready is 200 when the key set is reachable.
#[tokio::test]
async fn test_ready_with_key_set() -> Result<()> {
    let jwks = MockServer::start().await;
    mock_jwks::mount_keys(&jwks, &[TestKeypair::primary()]).await;
    let server = TestGatewayServer::spawn(TestServerOptions::new(mock_jwks::jwks_url(&jwks))).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["jwks"], "healthy");

    Ok(())
}

/// Test that /ready is 503 when the key set endpoint fails.
#[tokio::test]
async fn test_ready_without_key_set() -> Result<()> {
    let jwks = MockServer::start().await;
    mock_jwks::mount_status(&jwks, 500).await;
    let server = TestGatewayServer::spawn(TestServerOptions::new(mock_jwks::jwks_url(&jwks))).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["jwks"], "unhealthy");

    Ok(())
}

/// Test that /metrics serves Prometheus text including HTTP request metrics.
#[tokio::test]
async fn test_metrics_endpoint() -> Result<()> {
    let server = TestGatewayServer::spawn(TestServerOptions::new("http://127.0.0.1:9/jwks")).await?;

    reqwest::get(format!("{}/health", server.url())).await?;
    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);

    let text = response.text().await?;
    assert!(text.contains("gw_http_requests_total"));
    assert!(text.contains("gw_rate_limit_decisions_total"));

    Ok(())
}

/// Test that every response carries correlation and timing headers.
#[tokio::test]
async fn test_pipeline_headers() -> Result<()> {
    let server = TestGatewayServer::spawn(TestServerOptions::new("http://127.0.0.1:9/jwks")).await?;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for path in ["/health", "/api/v1/users/me", "/does-not-exist"] {
        let response = client.get(format!("{}{}", server.url(), path)).send().await?;

        assert!(
            response.headers().contains_key("x-request-id"),
            "{path} missing x-request-id"
        );
        let id = response.headers()["x-request-id"].to_str()?.to_string();
        assert_eq!(id.len(), 8);
        ids.push(id);

        let process_time: f64 = response
            .headers()
            .get("x-process-time")
            .unwrap()
            .to_str()?
            .parse()?;
        assert!(process_time >= 0.0);
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "request ids should be unique");

    Ok(())
}

/// Test forgot-password answers identically for any well-formed address.
#[tokio::test]
async fn test_forgot_password_is_success_shaped() -> Result<()> {
    let server = TestGatewayServer::spawn(TestServerOptions::new("http://127.0.0.1:9/jwks")).await?;
    let client = reqwest::Client::new();

    let mut first_body = None;
    for email in ["exists@example.com", "nobody@example.com"] {
        let response = client
            .post(format!("{}/api/v1/auth/forgot-password", server.url()))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["success"], true);
        match &first_body {
            None => first_body = Some(body),
            Some(first) => assert_eq!(first, &body),
        }
    }

    let response = client
        .post(format!("{}/api/v1/auth/forgot-password", server.url()))
        .json(&serde_json::json!({ "email": "" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    Ok(())
}

/// Test that unknown routes and wrong methods answer with the error body.
#[tokio::test]
async fn test_unmatched_requests_use_error_body() -> Result<()> {
    let server = TestGatewayServer::spawn(TestServerOptions::new("http://127.0.0.1:9/jwks")).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/posts", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 404);
    let request_id = response.headers()["x-request-id"].to_str()?.to_string();
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["request_id"], request_id.as_str());

    let response = client
        .put(format!("{}/api/v1/auth/forgot-password", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 405);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
    assert_eq!(body["error"]["message"], "Method PUT is not allowed");

    Ok(())
}
