//! Integration tests using WireMock
//!
//! These tests drive the full stack (reqwest transport, lifecycle manager,
//! gateway and operations) against a mock vendor API.

mod gateway;
mod operations;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rmm_gateway::{gateway_config, GatewayConfigBuilder, RetryPolicy};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SUBSCRIPTION_KEY: &str = "test-subscription-key";

/// Unsigned JWT for `group-42`, expiring in an hour.
pub fn test_token(subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let claims = json!({
        "sub": subject,
        "exp": chrono::Utc::now().timestamp() + 3600,
        "https://api.example.com/groupId": "group-42",
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Accept every probe call.
pub async fn mount_probe(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/tenants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// Config pointing at the mock server with fast, jitter-free retries.
pub fn test_config(server: &MockServer) -> GatewayConfigBuilder {
    gateway_config()
        .base_url(format!("{}/v1", server.uri()))
        .subscription_key(SUBSCRIPTION_KEY)
        .attempt_timeout(Duration::from_secs(5))
        .retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        })
}
