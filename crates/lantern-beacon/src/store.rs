//! SQLite-backed analysis store.
//!
//! The engine process is the only writer. Timestamps are RFC 3339 UTC text,
//! so `>` comparisons in SQL are chronological.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AnalysisRun, AutoAction, Decision, Escalation, EscalationStatus, RunStatus,
};

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_runs (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL DEFAULT 'running',
    errors_found INTEGER NOT NULL DEFAULT 0,
    auto_fixed INTEGER NOT NULL DEFAULT 0,
    escalated INTEGER NOT NULL DEFAULT 0,
    summary TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS escalations (
    id TEXT PRIMARY KEY,
    analysis_run_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    tier TEXT NOT NULL,
    service TEXT NOT NULL,
    error_summary TEXT NOT NULL,
    proposed_action TEXT NOT NULL,
    confidence REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    resolved_at TEXT,
    resolved_by TEXT,
    FOREIGN KEY (analysis_run_id) REFERENCES analysis_runs(id)
);

CREATE TABLE IF NOT EXISTS auto_actions_log (
    id TEXT PRIMARY KEY,
    analysis_run_id TEXT NOT NULL,
    executed_at TEXT NOT NULL,
    service TEXT NOT NULL,
    action TEXT NOT NULL,
    success INTEGER NOT NULL,
    output TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (analysis_run_id) REFERENCES analysis_runs(id)
);

CREATE INDEX IF NOT EXISTS idx_escalations_status ON escalations(status);
CREATE INDEX IF NOT EXISTS idx_runs_started ON analysis_runs(started_at);
CREATE INDEX IF NOT EXISTS idx_auto_actions_time ON auto_actions_log(executed_at);
"#;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Handle to the per-beacon analysis database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (and create if missing) the store at `path`, bootstrapping the
    /// schema. An unwritable path is fatal to the caller.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .unwrap_or_else(|_| SqliteConnectOptions::new().filename(path))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive across calls.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap_or_default();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(CREATE_TABLES).execute(&pool).await?;
        Ok(Self { pool })
    }

    // --- analysis runs ---

    /// Insert a new run in `running` state; returns its id.
    pub async fn create_run(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO analysis_runs (id, started_at, status) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(now())
            .bind(RunStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Mark a run completed with its counters and summary.
    pub async fn complete_run(
        &self,
        id: &str,
        errors_found: i64,
        auto_fixed: i64,
        escalated: i64,
        summary: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_runs SET status = ?, completed_at = ?, errors_found = ?, \
             auto_fixed = ?, escalated = ?, summary = ? WHERE id = ?",
        )
        .bind(RunStatus::Completed.as_str())
        .bind(now())
        .bind(errors_found)
        .bind(auto_fixed)
        .bind(escalated)
        .bind(summary)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a run failed, storing the failure text as its summary.
    pub async fn fail_run(&self, id: &str, summary: &str) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_runs SET status = ?, completed_at = ?, summary = ? WHERE id = ?",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(now())
        .bind(summary)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_run(&self, id: &str) -> Result<Option<AnalysisRun>> {
        Ok(
            sqlx::query_as::<_, AnalysisRun>("SELECT * FROM analysis_runs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_runs(&self, limit: i64) -> Result<Vec<AnalysisRun>> {
        Ok(sqlx::query_as::<_, AnalysisRun>(
            "SELECT * FROM analysis_runs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // --- auto actions ---

    /// Count Tier-1 executions in the trailing hour, for the rate limiter.
    pub async fn count_recent_auto_actions(&self) -> Result<i64> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let row = sqlx::query("SELECT count(*) AS n FROM auto_actions_log WHERE executed_at > ?")
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Append an executed-action record.
    pub async fn record_auto_action(
        &self,
        run_id: &str,
        service: &str,
        action: &str,
        success: bool,
        output: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO auto_actions_log (id, analysis_run_id, executed_at, service, action, \
             success, output) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(run_id)
        .bind(now())
        .bind(service)
        .bind(action)
        .bind(success)
        .bind(output)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_auto_actions(&self, limit: i64) -> Result<Vec<AutoAction>> {
        Ok(sqlx::query_as::<_, AutoAction>(
            "SELECT * FROM auto_actions_log ORDER BY executed_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // --- escalations ---

    /// Whether a pending escalation for `(service, action)` exists within the
    /// dedup window.
    pub async fn has_recent_pending_escalation(&self, service: &str, action: &str) -> Result<bool> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
        let row = sqlx::query(
            "SELECT id FROM escalations WHERE service = ? AND proposed_action = ? \
             AND status = 'pending' AND created_at > ? LIMIT 1",
        )
        .bind(service)
        .bind(action)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Create an escalation for `service` unless an equivalent pending one
    /// already exists. Returns the new id, or `None` when deduplicated.
    /// `service` is the collection grouping key, which may differ from the
    /// decision's own service field.
    pub async fn create_escalation(
        &self,
        run_id: &str,
        service: &str,
        decision: &Decision,
    ) -> Result<Option<String>> {
        if self
            .has_recent_pending_escalation(service, &decision.action)
            .await?
        {
            return Ok(None);
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO escalations (id, analysis_run_id, created_at, tier, service, \
             error_summary, proposed_action, confidence, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
        )
        .bind(&id)
        .bind(run_id)
        .bind(now())
        .bind(decision.tier.as_str())
        .bind(service)
        .bind(&decision.reasoning)
        .bind(&decision.action)
        .bind(decision.confidence)
        .execute(&self.pool)
        .await?;
        Ok(Some(id))
    }

    pub async fn get_escalation(&self, id: &str) -> Result<Option<Escalation>> {
        Ok(
            sqlx::query_as::<_, Escalation>("SELECT * FROM escalations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_escalations(&self, status: &str, limit: i64) -> Result<Vec<Escalation>> {
        Ok(sqlx::query_as::<_, Escalation>(
            "SELECT * FROM escalations WHERE status = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Stamp an escalation resolved.
    pub async fn resolve_escalation(
        &self,
        id: &str,
        status: EscalationStatus,
        resolved_by: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE escalations SET status = ?, resolved_at = ?, resolved_by = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(now())
        .bind(resolved_by)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- status aggregates ---

    pub async fn total_runs(&self) -> Result<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM analysis_runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn total_auto_fixes(&self) -> Result<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM auto_actions_log WHERE success = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn total_escalations(&self) -> Result<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM escalations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn last_run_started(&self) -> Result<Option<String>> {
        let row =
            sqlx::query("SELECT started_at FROM analysis_runs ORDER BY started_at DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.get::<String, _>("started_at")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::SafetyTier;

    fn decision(service: &str, action: &str) -> Decision {
        Decision {
            tier: SafetyTier::Suggest,
            action: action.to_string(),
            confidence: 0.8,
            reasoning: "unit keeps crashing".to_string(),
            service: service.to_string(),
            error_pattern: "service_failed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = Store::in_memory().await.unwrap();
        let id = store.create_run().await.unwrap();

        let run = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, "running");
        assert!(run.completed_at.is_none());

        store.complete_run(&id, 3, 1, 1, "done").await.unwrap();
        let run = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.errors_found, 3);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_error_summary() {
        let store = Store::in_memory().await.unwrap();
        let id = store.create_run().await.unwrap();
        store.fail_run(&id, "database locked").await.unwrap();
        let run = store.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert_eq!(run.summary, "database locked");
    }

    #[tokio::test]
    async fn test_escalation_dedup_within_window() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        let d = decision("caddy", "restart_service");

        let first = store.create_escalation(&run, "caddy", &d).await.unwrap();
        assert!(first.is_some());

        let second = store.create_escalation(&run, "caddy", &d).await.unwrap();
        assert!(second.is_none(), "duplicate pending escalation was created");

        let pending = store.list_escalations("pending", 50).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_dedup_ignores_resolved_escalations() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        let d = decision("caddy", "restart_service");

        let first = store.create_escalation(&run, "caddy", &d).await.unwrap().unwrap();
        store
            .resolve_escalation(&first, EscalationStatus::Rejected, "human")
            .await
            .unwrap();

        let second = store.create_escalation(&run, "caddy", &d).await.unwrap();
        assert!(second.is_some(), "resolved escalation blocked a new one");
    }

    #[tokio::test]
    async fn test_different_action_is_not_a_duplicate() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();

        store
            .create_escalation(&run, "caddy", &decision("caddy", "restart_service"))
            .await
            .unwrap();
        let other = store
            .create_escalation(&run, "caddy", &decision("caddy", "check_certificates"))
            .await
            .unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_rate_limit_counts_trailing_hour() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        assert_eq!(store.count_recent_auto_actions().await.unwrap(), 0);

        for i in 0..10 {
            store
                .record_auto_action(&run, "caddy", "restart_service", i % 2 == 0, "ok")
                .await
                .unwrap();
        }
        // Both successes and failures are charged.
        assert_eq!(store.count_recent_auto_actions().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_status_totals() {
        let store = Store::in_memory().await.unwrap();
        let run = store.create_run().await.unwrap();
        store
            .record_auto_action(&run, "caddy", "clear_tmp", true, "ok")
            .await
            .unwrap();
        store
            .record_auto_action(&run, "caddy", "clear_tmp", false, "boom")
            .await
            .unwrap();

        assert_eq!(store.total_runs().await.unwrap(), 1);
        assert_eq!(store.total_auto_fixes().await.unwrap(), 1);
        assert!(store.last_run_started().await.unwrap().is_some());
    }
}
