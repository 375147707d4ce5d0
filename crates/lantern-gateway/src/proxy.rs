//! Proxy to per-beacon analysis engines, plus fleet-wide aggregation.
//!
//! Reads are remediate-tier; approving or rejecting an escalation is
//! breakglass-only. A beacon that cannot be reached is a 502 for targeted
//! calls, and a per-beacon entry in the `errors` array for the aggregate.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use futures::future::join_all;
use lantern_core::{AccessTier, SupportUser};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::audit::AuditRecord;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::server::AppState;

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(30);
const APPROVE_TIMEOUT: Duration = Duration::from_secs(120);
const AGGREGATE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EscalationQuery {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_status() -> String {
    "pending".to_string()
}

fn default_limit() -> usize {
    100
}

async fn engine_url(state: &AppState, beacon_id: &str) -> Result<String> {
    db::fetch_beacon(&state.db, beacon_id)
        .await?
        .map(|b| b.ai_engine_url)
        .ok_or_else(|| GatewayError::NotFound(format!("Beacon {beacon_id} not found")))
}

/// Forward a downstream reply, passing its status through on error.
async fn passthrough(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| GatewayError::BeaconUnreachable(e.to_string()))
    } else {
        let text = response.text().await.unwrap_or_default();
        Err(GatewayError::Upstream(status.as_u16(), text))
    }
}

/// `GET /api/v1/beacons/{id}/ai/status`
pub async fn beacon_ai_status(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
) -> Result<Json<Value>> {
    user.require(AccessTier::Remediate)?;
    let url = engine_url(&state, &beacon_id).await?;

    let body = match state
        .http
        .get(format!("{url}/api/v1/ai/status"))
        .timeout(STATUS_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => {
            let mut value = passthrough(response).await?;
            if let Value::Object(map) = &mut value {
                map.insert("beacon_id".to_string(), Value::String(beacon_id.clone()));
            }
            value
        }
        // Status is a dashboard read; an unreachable engine is itself status.
        Err(e) => serde_json::json!({
            "beacon_id": beacon_id,
            "status": "unreachable",
            "error": e.to_string(),
        }),
    };

    AuditRecord::new(
        &user,
        "proxy.ai_status",
        "GET",
        format!("/api/v1/beacons/{beacon_id}/ai/status"),
    )
    .beacon(&beacon_id)
    .write(&state.db)
    .await?;
    Ok(Json(body))
}

/// `GET /api/v1/beacons/{id}/ai/escalations`
pub async fn beacon_escalations(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
    Query(query): Query<EscalationQuery>,
) -> Result<Json<Value>> {
    user.require(AccessTier::Remediate)?;
    let url = engine_url(&state, &beacon_id).await?;

    let response = state
        .http
        .get(format!("{url}/api/v1/ai/escalations"))
        .query(&[("status", query.status.as_str()), ("limit", &query.limit.to_string())])
        .timeout(LIST_TIMEOUT)
        .send()
        .await
        .map_err(|e| GatewayError::BeaconUnreachable(format!("{beacon_id}: {e}")))?;
    let mut value = passthrough(response).await?;

    if let Value::Array(items) = &mut value {
        for item in items {
            if let Value::Object(map) = item {
                map.insert("beacon_id".to_string(), Value::String(beacon_id.clone()));
            }
        }
    }

    AuditRecord::new(
        &user,
        "proxy.list_escalations",
        "GET",
        format!("/api/v1/beacons/{beacon_id}/ai/escalations"),
    )
    .beacon(&beacon_id)
    .write(&state.db)
    .await?;
    Ok(Json(value))
}

async fn resolve_escalation(
    state: &AppState,
    user: &SupportUser,
    beacon_id: &str,
    escalation_id: &str,
    verb: &str,
    timeout: Duration,
) -> Result<Value> {
    let url = engine_url(state, beacon_id).await?;
    let response = state
        .http
        .post(format!("{url}/api/v1/ai/escalations/{escalation_id}/{verb}"))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| GatewayError::BeaconUnreachable(format!("{beacon_id}: {e}")))?;
    let value = passthrough(response).await?;

    warn!(
        "escalation {escalation_id} on beacon {beacon_id} {verb}ed by {} ({})",
        user.username, user.uid
    );
    Ok(value)
}

/// `POST /api/v1/beacons/{id}/ai/escalations/{esc_id}/approve`
pub async fn approve_escalation(
    State(state): State<AppState>,
    user: SupportUser,
    Path((beacon_id, escalation_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    user.require(AccessTier::Breakglass)?;
    let value = resolve_escalation(
        &state,
        &user,
        &beacon_id,
        &escalation_id,
        "approve",
        APPROVE_TIMEOUT,
    )
    .await?;

    AuditRecord::new(
        &user,
        "proxy.approve_escalation",
        "POST",
        format!("/api/v1/beacons/{beacon_id}/ai/escalations/{escalation_id}/approve"),
    )
    .beacon(&beacon_id)
    .metadata(serde_json::json!({"escalation_id": escalation_id}))
    .write(&state.db)
    .await?;
    Ok(Json(value))
}

/// `POST /api/v1/beacons/{id}/ai/escalations/{esc_id}/reject`
pub async fn reject_escalation(
    State(state): State<AppState>,
    user: SupportUser,
    Path((beacon_id, escalation_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    user.require(AccessTier::Breakglass)?;
    let value = resolve_escalation(
        &state,
        &user,
        &beacon_id,
        &escalation_id,
        "reject",
        LIST_TIMEOUT,
    )
    .await?;

    AuditRecord::new(
        &user,
        "proxy.reject_escalation",
        "POST",
        format!("/api/v1/beacons/{beacon_id}/ai/escalations/{escalation_id}/reject"),
    )
    .beacon(&beacon_id)
    .metadata(serde_json::json!({"escalation_id": escalation_id}))
    .write(&state.db)
    .await?;
    Ok(Json(value))
}

#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub escalations: Vec<Value>,
    pub total: usize,
    pub beacons_queried: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<Value>>,
}

/// `GET /api/v1/beacons/all/escalations` - fleet-wide pending escalations.
///
/// Per-beacon failures are reported in `errors`; the aggregate is always 200.
pub async fn all_escalations(
    State(state): State<AppState>,
    user: SupportUser,
    Query(query): Query<EscalationQuery>,
) -> Result<Json<AggregateResponse>> {
    user.require(AccessTier::Remediate)?;

    let beacons = sqlx::query_as::<_, (String, String, String)>(
        "SELECT beacon_id, ai_engine_url, domain FROM beacons WHERE status != 'offline'",
    )
    .fetch_all(&state.db)
    .await?;
    let beacons_queried = beacons.len();

    let fetches = beacons.into_iter().map(|(beacon_id, url, domain)| {
        let http = state.http.clone();
        let status = query.status.clone();
        let limit = query.limit;
        async move {
            let result: std::result::Result<Vec<Value>, String> = async {
                let response = http
                    .get(format!("{url}/api/v1/ai/escalations"))
                    .query(&[("status", status.as_str()), ("limit", &limit.to_string())])
                    .timeout(AGGREGATE_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?
                    .error_for_status()
                    .map_err(|e| e.to_string())?;
                response.json().await.map_err(|e| e.to_string())
            }
            .await;
            (beacon_id, domain, result)
        }
    });

    let mut escalations = Vec::new();
    let mut errors = Vec::new();
    for (beacon_id, domain, result) in join_all(fetches).await {
        match result {
            Ok(items) => {
                for mut item in items {
                    if let Value::Object(map) = &mut item {
                        map.insert("beacon_id".to_string(), Value::String(beacon_id.clone()));
                        map.insert("beacon_domain".to_string(), Value::String(domain.clone()));
                    }
                    escalations.push(item);
                }
            }
            Err(e) => {
                warn!("aggregation: beacon {beacon_id} failed: {e}");
                errors.push(serde_json::json!({"beacon_id": beacon_id, "error": e}));
            }
        }
    }

    escalations.sort_by(|a, b| {
        let key = |v: &Value| v.get("created_at").and_then(Value::as_str).unwrap_or("").to_string();
        key(b).cmp(&key(a))
    });
    let total = escalations.len();
    escalations.truncate(query.limit);

    AuditRecord::new(
        &user,
        "proxy.all_escalations",
        "GET",
        "/api/v1/beacons/all/escalations".to_string(),
    )
    .write(&state.db)
    .await?;

    Ok(Json(AggregateResponse {
        escalations,
        total,
        beacons_queried,
        errors: if errors.is_empty() { None } else { Some(errors) },
    }))
}
