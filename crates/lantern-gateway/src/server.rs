//! Router assembly and shared state for the gateway.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::ca::CaClient;
use crate::config::GatewayConfig;
use crate::{audit, breakglass, diagnostics, proxy, registry, remediation};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<GatewayConfig>,
    pub http: reqwest::Client,
    pub ca: CaClient,
}

impl AppState {
    #[must_use]
    pub fn new(db: SqlitePool, config: GatewayConfig) -> Self {
        let ca = CaClient::new(config.ssh_ca_url.clone());
        Self {
            db,
            config: Arc::new(config),
            http: reqwest::Client::new(),
            ca,
        }
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Registry
        .route("/api/v1/beacons", get(registry::list_beacons))
        .route("/api/v1/beacons/register", post(registry::register_beacon))
        .route("/api/v1/beacons/heartbeat", post(registry::beacon_heartbeat))
        .route("/api/v1/beacons/all/escalations", get(proxy::all_escalations))
        .route("/api/v1/beacons/:id", get(registry::get_beacon))
        // Diagnostics
        .route("/api/v1/beacons/:id/health", get(diagnostics::beacon_health))
        .route("/api/v1/beacons/:id/logs", get(diagnostics::beacon_logs))
        .route("/api/v1/beacons/:id/services", get(diagnostics::beacon_services))
        // Engine proxy
        .route("/api/v1/beacons/:id/ai/status", get(proxy::beacon_ai_status))
        .route("/api/v1/beacons/:id/ai/escalations", get(proxy::beacon_escalations))
        .route(
            "/api/v1/beacons/:id/ai/escalations/:esc_id/approve",
            post(proxy::approve_escalation),
        )
        .route(
            "/api/v1/beacons/:id/ai/escalations/:esc_id/reject",
            post(proxy::reject_escalation),
        )
        // Remediation
        .route("/api/v1/remediation/actions", get(remediation::list_actions))
        .route("/api/v1/beacons/:id/remediate", post(remediation::execute_remediation))
        // Breakglass
        .route("/api/v1/beacons/:id/breakglass", post(breakglass::start_session))
        .route("/api/v1/breakglass/sessions", get(breakglass::list_sessions))
        .route("/api/v1/breakglass/:id/revoke", post(breakglass::revoke_session))
        // Audit (breakglass tier)
        .route("/api/v1/audit/logs", get(audit::query_logs))
        .route("/api/v1/audit/logs/:id", get(audit::get_log_entry))
        .route("/api/v1/audit/sessions", get(audit::list_all_sessions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    Json(serde_json::json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "service": "lantern-gateway",
        "database": if db_ok { "connected" } else { "disconnected" },
    }))
}
