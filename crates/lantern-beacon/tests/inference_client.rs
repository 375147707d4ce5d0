//! Inference client behavior against a mock Ollama endpoint.

#![allow(clippy::unwrap_used)]

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lantern_beacon::inference::OllamaClient;
use lantern_beacon::models::SafetyTier;

#[tokio::test]
async fn test_classify_parses_json_mode_reply() {
    let mock = MockServer::start().await;
    let inner = serde_json::json!({
        "tier": "tier1_auto",
        "action": "restart_service",
        "confidence": 0.85,
        "reasoning": "unit exited with SIGKILL",
        "service": "redis",
        "error_pattern": "process_killed",
    });
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({
            "model": "phi3:mini",
            "stream": false,
            "format": "json",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": inner.to_string(),
        })))
        .mount(&mock)
        .await;

    let client = OllamaClient::new(mock.uri(), "phi3:mini");
    let decision = client.classify("redis", "[t] error: killed").await.unwrap();
    assert_eq!(decision.tier, SafetyTier::Auto);
    assert_eq!(decision.action, "restart_service");
    assert_eq!(decision.service, "redis");
    assert!((decision.confidence - 0.85).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_missing_fields_are_defaulted() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "{}",
        })))
        .mount(&mock)
        .await;

    let client = OllamaClient::new(mock.uri(), "phi3:mini");
    let decision = client.classify("caddy", "digest").await.unwrap();
    assert_eq!(decision.tier, SafetyTier::Escalate);
    assert_eq!(decision.action, "investigate");
    assert!((decision.confidence - 0.5).abs() < f64::EPSILON);
    assert_eq!(decision.service, "caddy");
    assert_eq!(decision.error_pattern, "unknown");
}

#[tokio::test]
async fn test_non_json_response_field_yields_none() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "I think you should restart the service.",
        })))
        .mount(&mock)
        .await;

    let client = OllamaClient::new(mock.uri(), "phi3:mini");
    assert!(client.classify("caddy", "digest").await.is_none());
}

#[tokio::test]
async fn test_server_error_yields_none() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock)
        .await;

    let client = OllamaClient::new(mock.uri(), "phi3:mini");
    assert!(client.classify("caddy", "digest").await.is_none());
}

#[tokio::test]
async fn test_unreachable_endpoint_yields_none() {
    let client = OllamaClient::new("http://127.0.0.1:1", "phi3:mini");
    assert!(client.classify("caddy", "digest").await.is_none());
}

#[tokio::test]
async fn test_availability_probe() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
        .mount(&mock)
        .await;

    let client = OllamaClient::new(mock.uri(), "phi3:mini");
    assert!(client.available().await);

    let dead = OllamaClient::new("http://127.0.0.1:1", "phi3:mini");
    assert!(!dead.available().await);
}
