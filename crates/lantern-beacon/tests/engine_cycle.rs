//! End-to-end analysis-cycle behavior against an in-memory store and
//! synthetic error sources.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lantern_beacon::collector::ErrorSource;
use lantern_beacon::inference::OllamaClient;
use lantern_beacon::models::{ErrorOrigin, ErrorRecord, SafetyTier};
use lantern_beacon::notifier::Notifier;
use lantern_beacon::store::Store;
use lantern_beacon::{AnalysisEngine, EngineConfig};

/// Error source that replays a fixed batch every cycle.
struct StaticSource {
    records: Vec<ErrorRecord>,
}

#[async_trait]
impl ErrorSource for StaticSource {
    async fn collect(&self, _window: Duration) -> Vec<ErrorRecord> {
        self.records.clone()
    }
}

fn record(service: &str, message: &str) -> ErrorRecord {
    ErrorRecord {
        origin: ErrorOrigin::Journal,
        service: service.to_string(),
        severity: "error".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        message: message.to_string(),
        request_path: None,
        response_status: None,
        duration_ms: None,
    }
}

/// Notifier that records every call.
#[derive(Default)]
struct RecordingNotifier {
    escalations: Mutex<Vec<String>>,
    auto_fix_failures: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_escalation(
        &self,
        _tier: SafetyTier,
        service: &str,
        _error_summary: &str,
        _proposed_action: &str,
        _confidence: f64,
        _escalation_id: &str,
    ) {
        self.escalations.lock().unwrap().push(service.to_string());
    }

    async fn notify_auto_fix_failure(&self, service: &str, _action: &str, _output: &str) {
        self.auto_fix_failures
            .lock()
            .unwrap()
            .push(service.to_string());
    }
}

fn engine_with(
    store: Store,
    ollama_url: &str,
    notifier: Arc<RecordingNotifier>,
    records: Vec<ErrorRecord>,
) -> Arc<AnalysisEngine> {
    let config = EngineConfig::default();
    let ollama = OllamaClient::new(ollama_url, "test-model");
    Arc::new(AnalysisEngine::new(
        store,
        config,
        ollama,
        notifier,
        vec![Arc::new(StaticSource { records })],
    ))
}

#[tokio::test]
async fn test_pattern_fast_path_skips_the_model() {
    // A mock inference endpoint that must never be called.
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        Store::in_memory().await.unwrap(),
        &mock.uri(),
        Arc::clone(&notifier),
        vec![record("caddy", "Out of memory: kill process 1234")],
    );

    let run_id = engine.run_analysis_cycle().await.unwrap();
    let run = engine.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.errors_found, 1);
    assert_eq!(run.escalated, 1);
    assert_eq!(run.auto_fixed, 0);

    let pending = engine.store().list_escalations("pending", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tier, "tier2_suggest");
    assert_eq!(pending[0].proposed_action, "check_memory");
    assert!((pending[0].confidence - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_rate_limit_downgrades_auto_to_suggest() {
    let store = Store::in_memory().await.unwrap();
    let seed_run = store.create_run().await.unwrap();
    for _ in 0..10 {
        store
            .record_auto_action(&seed_run, "other", "clear_tmp", true, "ok")
            .await
            .unwrap();
    }

    let notifier = Arc::new(RecordingNotifier::default());
    // "Connection refused" maps to tier1_auto restart_service at 0.8.
    let engine = engine_with(
        store,
        "http://127.0.0.1:1",
        Arc::clone(&notifier),
        vec![record("caddy", "connect to upstream: Connection refused")],
    );

    let run_id = engine.run_analysis_cycle().await.unwrap();
    let run = engine.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.auto_fixed, 0);
    assert_eq!(run.escalated, 1);

    // The budget was not charged for the downgraded decision.
    assert_eq!(engine.store().count_recent_auto_actions().await.unwrap(), 10);

    let pending = engine.store().list_escalations("pending", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].proposed_action, "restart_service");
}

#[tokio::test]
async fn test_duplicate_escalation_is_not_recreated_or_renotified() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        Store::in_memory().await.unwrap(),
        "http://127.0.0.1:1",
        Arc::clone(&notifier),
        vec![record("caddy", "Out of memory: kill process 1234")],
    );

    let first = engine.run_analysis_cycle().await.unwrap();
    let second = engine.run_analysis_cycle().await.unwrap();

    let run1 = engine.store().get_run(&first).await.unwrap().unwrap();
    let run2 = engine.store().get_run(&second).await.unwrap().unwrap();
    assert_eq!(run1.escalated, 1);
    assert_eq!(run2.escalated, 0, "duplicate escalation was counted");

    let pending = engine.store().list_escalations("pending", 10).await.unwrap();
    assert_eq!(pending.len(), 1);

    // Exactly one notification across both cycles.
    assert_eq!(notifier.escalations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_one_outcome_per_service_per_cycle() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        Store::in_memory().await.unwrap(),
        "http://127.0.0.1:1",
        Arc::clone(&notifier),
        vec![
            record("caddy", "Out of memory: kill process 1"),
            record("caddy", "Out of memory: kill process 2"),
            record("redis", "certificate expired for peer"),
        ],
    );

    let run_id = engine.run_analysis_cycle().await.unwrap();
    let run = engine.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.errors_found, 3);
    // Two services, each yielding at most one outcome.
    assert!(run.auto_fixed + run.escalated <= 2);
    assert_eq!(run.escalated, 2);
}

#[tokio::test]
async fn test_unreachable_model_skips_service_without_failing_run() {
    let notifier = Arc::new(RecordingNotifier::default());
    // No taxonomy hit, so classification falls through to the (dead) model.
    let engine = engine_with(
        Store::in_memory().await.unwrap(),
        "http://127.0.0.1:1",
        Arc::clone(&notifier),
        vec![record("caddy", "something entirely novel happened")],
    );

    let run_id = engine.run_analysis_cycle().await.unwrap();
    let run = engine.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.errors_found, 1);
    assert_eq!(run.escalated, 0);
    assert_eq!(run.auto_fixed, 0);
}

#[tokio::test]
async fn test_model_blocklist_reply_is_forced_to_escalate() {
    let mock = MockServer::start().await;
    let inner = serde_json::json!({
        "tier": "tier1_auto",
        "action": "rm -rf /var/log",
        "confidence": 0.95,
        "reasoning": "free disk space",
        "service": "caddy",
        "error_pattern": "disk_pressure",
    });
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": inner.to_string(),
        })))
        .mount(&mock)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        Store::in_memory().await.unwrap(),
        &mock.uri(),
        Arc::clone(&notifier),
        vec![record("caddy", "novel log pressure condition")],
    );

    let run_id = engine.run_analysis_cycle().await.unwrap();
    let run = engine.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.escalated, 1);
    assert_eq!(run.auto_fixed, 0);

    let pending = engine.store().list_escalations("pending", 10).await.unwrap();
    assert_eq!(pending[0].tier, "tier3_escalate");
    assert!((pending[0].confidence - 0.0).abs() < f64::EPSILON);
    assert!(pending[0].error_summary.contains("BLOCKED"));
}
