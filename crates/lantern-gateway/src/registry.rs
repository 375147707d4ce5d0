//! Beacon registry: self-registration, heartbeat, and registry reads.
//!
//! Registration and heartbeat are unauthenticated - beacons have no operator
//! identity - but the observed source address is recorded and a claimed IP
//! that disagrees with it is logged, not trusted.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use lantern_core::{AccessTier, SupportUser};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::audit::AuditRecord;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::models::{BeaconHeartbeat, BeaconInfo, BeaconRegistration, BeaconSummary};
use crate::server::AppState;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Best view of the caller's address: forwarded header first, socket second.
fn client_ip(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| connect.map(|c| c.0.ip().to_string()))
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub beacon_id: String,
    pub message: String,
}

/// `POST /api/v1/beacons/register`
pub async fn register_beacon(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<BeaconRegistration>,
) -> Result<Json<RegisterResponse>> {
    let observed_ip = client_ip(&headers, connect.as_ref());
    if let Some(claimed) = &body.public_ip {
        if !observed_ip.is_empty() && claimed != &observed_ip {
            warn!(
                "beacon {} IP mismatch: claimed {claimed}, observed {observed_ip}",
                body.beacon_id
            );
        }
    }
    let public_ip = body.public_ip.clone().unwrap_or_else(|| observed_ip.clone());

    sqlx::query(
        "INSERT INTO beacons (beacon_id, domain, ai_engine_url, public_ip, bundle_id, \
         version, registered_at, last_seen, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'online') \
         ON CONFLICT (beacon_id) DO UPDATE SET \
             domain = excluded.domain, \
             ai_engine_url = excluded.ai_engine_url, \
             public_ip = excluded.public_ip, \
             bundle_id = excluded.bundle_id, \
             version = excluded.version, \
             last_seen = excluded.last_seen, \
             status = 'online'",
    )
    .bind(&body.beacon_id)
    .bind(&body.domain)
    .bind(&body.ai_engine_url)
    .bind(&public_ip)
    .bind(&body.bundle_id)
    .bind(&body.version)
    .bind(now())
    .bind(now())
    .execute(&state.db)
    .await?;

    info!(
        "beacon registered: {} ({}) at {public_ip}",
        body.beacon_id, body.domain
    );

    Ok(Json(RegisterResponse {
        status: "registered",
        beacon_id: body.beacon_id,
        message: format!("Add {public_ip} to your analysis-engine allowlist"),
    }))
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub status: &'static str,
    pub beacon_status: String,
}

/// `POST /api/v1/beacons/heartbeat`
pub async fn beacon_heartbeat(
    State(state): State<AppState>,
    Json(body): Json<BeaconHeartbeat>,
) -> Result<Json<HeartbeatResponse>> {
    let status = if body.ai_engine_status == "running" {
        "online"
    } else {
        "degraded"
    };

    let result = sqlx::query("UPDATE beacons SET last_seen = ?, status = ? WHERE beacon_id = ?")
        .bind(now())
        .bind(status)
        .bind(&body.beacon_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::NotFound(format!(
            "Beacon {} not registered",
            body.beacon_id
        )));
    }

    Ok(Json(HeartbeatResponse {
        status: "ok",
        beacon_status: status.to_string(),
    }))
}

/// `GET /api/v1/beacons` - summary list, diagnostic tier.
pub async fn list_beacons(
    State(state): State<AppState>,
    user: SupportUser,
) -> Result<Json<Vec<BeaconSummary>>> {
    user.require(AccessTier::Diag)?;

    let beacons = sqlx::query_as::<_, BeaconSummary>(
        "SELECT beacon_id, domain, public_ip, status FROM beacons ORDER BY domain",
    )
    .fetch_all(&state.db)
    .await?;

    AuditRecord::new(&user, "diag.list_beacons", "GET", "/api/v1/beacons".to_string())
        .write(&state.db)
        .await?;
    Ok(Json(beacons))
}

/// `GET /api/v1/beacons/{id}` - full registry row, remediate tier.
pub async fn get_beacon(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
) -> Result<Json<BeaconInfo>> {
    user.require(AccessTier::Remediate)?;

    let beacon = db::fetch_beacon(&state.db, &beacon_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("Beacon {beacon_id} not found")))?;

    AuditRecord::new(
        &user,
        "registry.get_beacon",
        "GET",
        format!("/api/v1/beacons/{beacon_id}"),
    )
    .beacon(&beacon_id)
    .write(&state.db)
    .await?;
    Ok(Json(beacon))
}
