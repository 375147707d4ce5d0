//! Analysis engine: one cycle of collect → classify → decide → act/escalate,
//! plus the periodic scheduler that drives it.
//!
//! Cycles are strictly serial: the scheduler runs one at a time, and
//! `analyze-now` requests run on the caller's task. Within a cycle, services
//! are processed sequentially and each service yields at most one outcome.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collector::ErrorSource;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor;
use crate::inference::OllamaClient;
use crate::models::{Decision, EngineStatus, ErrorRecord, SafetyTier};
use crate::notifier::Notifier;
use crate::patterns;
use crate::safety;
use crate::store::Store;

const COLLECTION_WINDOW: Duration = Duration::from_secs(5 * 60);
const DIGEST_CAP: usize = 10;

struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owner object for the per-beacon analysis pipeline.
pub struct AnalysisEngine {
    store: Store,
    config: EngineConfig,
    ollama: OllamaClient,
    notifier: Arc<dyn Notifier>,
    sources: Vec<Arc<dyn ErrorSource>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl AnalysisEngine {
    #[must_use]
    pub fn new(
        store: Store,
        config: EngineConfig,
        ollama: OllamaClient,
        notifier: Arc<dyn Notifier>,
        sources: Vec<Arc<dyn ErrorSource>>,
    ) -> Self {
        Self {
            store,
            config,
            ollama,
            notifier,
            sources,
            scheduler: Mutex::new(None),
        }
    }

    /// The analysis store, shared with the HTTP surface.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one full analysis cycle and return the run id. A failure inside
    /// the cycle marks the run `failed` but still returns its id; the error
    /// never reaches the scheduler.
    pub async fn run_analysis_cycle(&self) -> Result<String> {
        let run_id = self.store.create_run().await?;

        if let Err(e) = self.cycle_inner(&run_id).await {
            error!("analysis cycle {run_id} failed: {e}");
            self.store.fail_run(&run_id, &e.to_string()).await?;
        }
        Ok(run_id)
    }

    async fn cycle_inner(&self, run_id: &str) -> Result<()> {
        let mut errors = Vec::new();
        for source in &self.sources {
            errors.extend(source.collect(COLLECTION_WINDOW).await);
        }
        let errors_found = errors.len() as i64;

        if errors.is_empty() {
            self.store
                .complete_run(run_id, 0, 0, 0, "No errors found")
                .await?;
            return Ok(());
        }

        // Group by service; BTreeMap keeps the per-cycle order stable.
        let mut by_service: BTreeMap<String, Vec<ErrorRecord>> = BTreeMap::new();
        for record in errors {
            by_service
                .entry(record.service.clone())
                .or_default()
                .push(record);
        }
        let service_count = by_service.len();

        let mut auto_fixed = 0i64;
        let mut escalated = 0i64;

        for (service, records) in &by_service {
            let Some(decision) = self.classify(service, records).await else {
                continue;
            };
            self.act_on_decision(run_id, service, decision, &mut auto_fixed, &mut escalated)
                .await?;
        }

        let summary = format!(
            "Found {errors_found} errors across {service_count} services. \
             Auto-fixed: {auto_fixed}. Escalated: {escalated}."
        );
        self.store
            .complete_run(run_id, errors_found, auto_fixed, escalated, &summary)
            .await?;
        Ok(())
    }

    /// Classify one service's errors: taxonomy first, model second, the
    /// safety validator always last. `None` means the service is skipped
    /// this cycle.
    pub async fn classify(&self, service: &str, records: &[ErrorRecord]) -> Option<Decision> {
        // Known-pattern fast path; the first hit wins and skips inference.
        for record in records {
            if let Some(hit) = patterns::match_known(&record.message) {
                let mut decision = Decision {
                    tier: hit.tier,
                    action: hit.action,
                    confidence: hit.confidence,
                    reasoning: hit.reasoning,
                    service: service.to_string(),
                    error_pattern: hit.name,
                };
                safety::validate(&mut decision, self.config.min_confidence);
                return Some(decision);
            }
        }

        let digest: String = records
            .iter()
            .take(DIGEST_CAP)
            .map(|r| format!("[{}] {}: {}", r.timestamp, r.severity, r.message))
            .collect::<Vec<_>>()
            .join("\n");

        let mut decision = self.ollama.classify(service, &digest).await?;
        safety::validate(&mut decision, self.config.min_confidence);
        Some(decision)
    }

    async fn act_on_decision(
        &self,
        run_id: &str,
        service: &str,
        mut decision: Decision,
        auto_fixed: &mut i64,
        escalated: &mut i64,
    ) -> Result<()> {
        if decision.tier == SafetyTier::Auto {
            let recent = self.store.count_recent_auto_actions().await?;
            if recent >= self.config.max_auto_actions_per_hour {
                warn!("hourly auto-action budget exhausted, downgrading {service} to suggest");
                decision.tier = SafetyTier::Suggest;
            }
        }

        if decision.tier == SafetyTier::Auto {
            let outcome = executor::execute_action(&decision.action, &decision.service).await;
            self.store
                .record_auto_action(
                    run_id,
                    service,
                    &decision.action,
                    outcome.success,
                    &outcome.output,
                )
                .await?;
            if outcome.success {
                *auto_fixed += 1;
            } else if self
                .store
                .create_escalation(run_id, service, &decision)
                .await?
                .is_some()
            {
                *escalated += 1;
                self.notifier
                    .notify_auto_fix_failure(service, &decision.action, &outcome.output)
                    .await;
            }
        } else if let Some(esc_id) = self
            .store
            .create_escalation(run_id, service, &decision)
            .await?
        {
            *escalated += 1;
            self.notifier
                .notify_escalation(
                    decision.tier,
                    service,
                    &decision.reasoning,
                    &decision.action,
                    decision.confidence,
                    &esc_id,
                )
                .await;
        }
        Ok(())
    }

    /// Current engine status for the HTTP surface.
    pub async fn status(&self) -> Result<EngineStatus> {
        let recent = self.store.count_recent_auto_actions().await?;
        Ok(EngineStatus {
            running: self.is_running(),
            ollama_available: self.ollama.available().await,
            model: self.ollama.model().to_string(),
            last_run: self.store.last_run_started().await?,
            total_runs: self.store.total_runs().await?,
            total_auto_fixes: self.store.total_auto_fixes().await?,
            total_escalations: self.store.total_escalations().await?,
            rate_limit_remaining: (self.config.max_auto_actions_per_hour - recent).max(0),
        })
    }

    // --- scheduler ---

    /// Start the periodic scheduler. Idempotent: a second call while running
    /// is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut guard = match self.scheduler.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let interval = self.config.scan_interval;
        let task = tokio::spawn(async move {
            info!("analysis scheduler started (interval: {}s)", interval.as_secs());
            loop {
                match engine.run_analysis_cycle().await {
                    Ok(run_id) => info!("analysis cycle completed: {run_id}"),
                    Err(e) => error!("scan loop error: {e}"),
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            info!("analysis scheduler stopped");
        });

        *guard = Some(SchedulerHandle { stop: stop_tx, task });
    }

    /// Stop the scheduler. The inter-cycle sleep is cancelled; an in-flight
    /// cycle finishes naturally. Idempotent.
    pub fn stop(&self) {
        let mut guard = match self.scheduler.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            let _ = handle.stop.send(true);
            // Not awaited: the task exits at its next suspension point.
            drop(handle.task);
        }
    }

    /// Whether the scheduler is running (not whether a cycle is in flight).
    #[must_use]
    pub fn is_running(&self) -> bool {
        match self.scheduler.lock() {
            Ok(g) => g.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notifier::NoopNotifier;

    fn test_engine(store: Store) -> Arc<AnalysisEngine> {
        Arc::new(AnalysisEngine::new(
            store,
            EngineConfig::default(),
            OllamaClient::new("http://127.0.0.1:1", "test-model"),
            Arc::new(NoopNotifier),
            Vec::new(),
        ))
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let engine = test_engine(Store::in_memory().await.unwrap());
        engine.start();
        assert!(engine.is_running());
        engine.start();
        assert!(engine.is_running());
        engine.stop();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let engine = test_engine(Store::in_memory().await.unwrap());
        engine.stop();
        engine.start();
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_empty_cycle_completes_with_no_errors() {
        let engine = test_engine(Store::in_memory().await.unwrap());
        let run_id = engine.run_analysis_cycle().await.unwrap();
        let run = engine.store().get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.errors_found, 0);
        assert_eq!(run.summary, "No errors found");
    }
}
