//! Best-effort notifications for escalations and failed auto-fixes.
//!
//! Notification failures are logged and dropped; they never propagate into
//! the analysis cycle. Successful auto-fixes are deliberately quiet.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::models::SafetyTier;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound notification contract.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A new escalation was opened.
    async fn notify_escalation(
        &self,
        tier: SafetyTier,
        service: &str,
        error_summary: &str,
        proposed_action: &str,
        confidence: f64,
        escalation_id: &str,
    );

    /// A Tier-1 action executed and failed.
    async fn notify_auto_fix_failure(&self, service: &str, action: &str, output: &str);
}

/// Default notifier when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_escalation(
        &self,
        _tier: SafetyTier,
        service: &str,
        _error_summary: &str,
        _proposed_action: &str,
        _confidence: f64,
        escalation_id: &str,
    ) {
        debug!("escalation {escalation_id} for {service} (no webhook configured)");
    }

    async fn notify_auto_fix_failure(&self, service: &str, action: &str, _output: &str) {
        debug!("auto-fix failure {action} on {service} (no webhook configured)");
    }
}

/// POSTs notification events as JSON to a configured webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn post(&self, payload: serde_json::Value) {
        let result = self
            .http
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            warn!("notification webhook failed: {e}");
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_escalation(
        &self,
        tier: SafetyTier,
        service: &str,
        error_summary: &str,
        proposed_action: &str,
        confidence: f64,
        escalation_id: &str,
    ) {
        self.post(json!({
            "event": "escalation",
            "tier": tier.as_str(),
            "service": service,
            "error_summary": error_summary,
            "proposed_action": proposed_action,
            "confidence": confidence,
            "escalation_id": escalation_id,
        }))
        .await;
    }

    async fn notify_auto_fix_failure(&self, service: &str, action: &str, output: &str) {
        self.post(json!({
            "event": "auto_fix_failure",
            "service": service,
            "action": action,
            "output": output,
        }))
        .await;
    }
}
