//! JSON-mode inference client for the local Ollama endpoint.
//!
//! The model is an opaque oracle: one request per service, one JSON reply.
//! Any failure - timeout, non-2xx status, a reply that is not JSON - yields
//! `None` and the engine skips that service for the cycle. The reply is
//! untrusted; missing fields are defaulted, never errored on.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::models::{Decision, SafetyTier};
use crate::prompts::{analysis_prompt, SYSTEM_PROMPT};

const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire shape of the Ollama generate reply; only `response` matters.
#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
}

/// Client for the Ollama HTTP API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Model id this client generates with.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the inference endpoint answers at all.
    pub async fn available(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Ask the model to classify one service's error digest.
    ///
    /// Returns `None` on any transport or parse failure.
    pub async fn classify(&self, service: &str, digest: &str) -> Option<Decision> {
        let body = json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "prompt": analysis_prompt(service, digest),
            "stream": false,
            "format": "json",
            "options": {"temperature": 0.1, "num_predict": 256},
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let reply: GenerateReply = match response {
            Ok(resp) => match resp.json().await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("inference reply was not JSON: {e}");
                    return None;
                }
            },
            Err(e) => {
                debug!("inference request failed: {e}");
                return None;
            }
        };

        let raw: serde_json::Value = match serde_json::from_str(&reply.response) {
            Ok(v) => v,
            Err(e) => {
                warn!("inference response field was not JSON: {e}");
                return None;
            }
        };

        Some(decision_with_defaults(&raw, service))
    }
}

/// Build a decision from an untrusted JSON value, defaulting absent or
/// malformed fields the same way for every reply.
fn decision_with_defaults(raw: &serde_json::Value, service: &str) -> Decision {
    let str_or = |key: &str, default: &str| {
        raw.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    };

    Decision {
        tier: raw
            .get("tier")
            .and_then(|v| v.as_str())
            .and_then(SafetyTier::parse)
            .unwrap_or(SafetyTier::Escalate),
        action: str_or("action", "investigate"),
        confidence: raw.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5),
        reasoning: str_or("reasoning", "LLM analysis"),
        service: str_or("service", service),
        error_pattern: str_or("error_pattern", "unknown"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_empty_reply() {
        let d = decision_with_defaults(&json!({}), "caddy");
        assert_eq!(d.tier, SafetyTier::Escalate);
        assert_eq!(d.action, "investigate");
        assert!((d.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(d.service, "caddy");
        assert_eq!(d.error_pattern, "unknown");
    }

    #[test]
    fn test_reply_fields_take_precedence() {
        let raw = json!({
            "tier": "tier1_auto",
            "action": "restart_service",
            "confidence": 0.85,
            "reasoning": "unit crashed",
            "service": "redis",
            "error_pattern": "process_killed",
        });
        let d = decision_with_defaults(&raw, "caddy");
        assert_eq!(d.tier, SafetyTier::Auto);
        assert_eq!(d.action, "restart_service");
        assert_eq!(d.service, "redis");
    }

    #[test]
    fn test_unknown_tier_string_defaults_to_escalate() {
        let d = decision_with_defaults(&json!({"tier": "tier0_godmode"}), "caddy");
        assert_eq!(d.tier, SafetyTier::Escalate);
    }

    #[test]
    fn test_non_numeric_confidence_defaults() {
        let d = decision_with_defaults(&json!({"confidence": "high"}), "caddy");
        assert!((d.confidence - 0.5).abs() < f64::EPSILON);
    }
}
