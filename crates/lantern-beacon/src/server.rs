//! Beacon-local HTTP API.
//!
//! Served on the beacon itself and proxied to by the lighthouse gateway.
//! There is no authentication here; the edge proxy restricts who can reach
//! the listener.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::AnalysisEngine;
use crate::error::{EngineError, Result};
use crate::executor;
use crate::models::{AnalysisRun, AutoAction, EngineStatus, Escalation, EscalationStatus};

/// Build the beacon API router.
pub fn router(engine: Arc<AnalysisEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ai/status", get(status))
        .route("/api/v1/ai/escalations", get(list_escalations))
        .route("/api/v1/ai/escalations/:id/approve", post(approve_escalation))
        .route("/api/v1/ai/escalations/:id/reject", post(reject_escalation))
        .route("/api/v1/ai/analyze-now", post(analyze_now))
        .route("/api/v1/ai/history", get(history))
        .route("/api/v1/ai/actions", get(actions))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
struct EscalationQuery {
    #[serde(default = "default_status")]
    status: String,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_status() -> String {
    "pending".to_string()
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        service: "lantern-beacon",
    })
}

async fn status(State(engine): State<Arc<AnalysisEngine>>) -> Result<Json<EngineStatus>> {
    Ok(Json(engine.status().await?))
}

async fn list_escalations(
    State(engine): State<Arc<AnalysisEngine>>,
    Query(query): Query<EscalationQuery>,
) -> Result<Json<Vec<Escalation>>> {
    Ok(Json(
        engine
            .store()
            .list_escalations(&query.status, query.limit)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
struct ApproveBody {
    status: &'static str,
    action_success: bool,
    output: String,
}

async fn approve_escalation(
    State(engine): State<Arc<AnalysisEngine>>,
    Path(id): Path<String>,
) -> Result<Json<ApproveBody>> {
    let escalation = engine
        .store()
        .get_escalation(&id)
        .await?
        .ok_or_else(|| EngineError::NotFound("Escalation not found".to_string()))?;
    if escalation.status != "pending" {
        return Err(EngineError::InvalidState(format!(
            "Escalation already {}",
            escalation.status
        )));
    }

    let outcome =
        executor::execute_action(&escalation.proposed_action, &escalation.service).await;
    engine
        .store()
        .resolve_escalation(&id, EscalationStatus::Approved, "human")
        .await?;
    info!(
        "escalation {id} approved: action={} success={}",
        escalation.proposed_action, outcome.success
    );

    Ok(Json(ApproveBody {
        status: "approved",
        action_success: outcome.success,
        output: outcome.output,
    }))
}

#[derive(Debug, Serialize)]
struct RejectBody {
    status: &'static str,
}

async fn reject_escalation(
    State(engine): State<Arc<AnalysisEngine>>,
    Path(id): Path<String>,
) -> Result<Json<RejectBody>> {
    engine
        .store()
        .get_escalation(&id)
        .await?
        .ok_or_else(|| EngineError::NotFound("Escalation not found".to_string()))?;

    engine
        .store()
        .resolve_escalation(&id, EscalationStatus::Rejected, "human")
        .await?;
    Ok(Json(RejectBody { status: "rejected" }))
}

async fn analyze_now(State(engine): State<Arc<AnalysisEngine>>) -> Result<Json<AnalysisRun>> {
    let run_id = engine.run_analysis_cycle().await?;
    let run = engine
        .store()
        .get_run(&run_id)
        .await?
        .ok_or_else(|| EngineError::Internal("run row vanished".to_string()))?;
    Ok(Json(run))
}

async fn history(
    State(engine): State<Arc<AnalysisEngine>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AnalysisRun>>> {
    Ok(Json(engine.store().list_runs(query.limit).await?))
}

async fn actions(
    State(engine): State<Arc<AnalysisEngine>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AutoAction>>> {
    Ok(Json(engine.store().list_auto_actions(query.limit).await?))
}
