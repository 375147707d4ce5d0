//! Breakglass session lifecycle.
//!
//! A breakglass session is a time-boxed grant of unrestricted access to one
//! beacon. Opening one mints a breakglass certificate from the CA in the
//! same request; if issuance fails the session row is rolled back so no
//! orphaned grant survives. A background sweeper expires overdue sessions
//! once a minute.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use lantern_core::{AccessTier, SupportUser};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::models::{
    BreakglassRequest, BreakglassResponse, BreakglassRevokeRequest, BreakglassSession,
};
use crate::server::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const MIN_REASON_LEN: usize = 20;
const BREAKGLASS_USER: &str = "wopr-breakglass";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// `POST /api/v1/beacons/{id}/breakglass`
pub async fn start_session(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
    Json(body): Json<BreakglassRequest>,
) -> Result<Json<BreakglassResponse>> {
    user.require(AccessTier::Breakglass)?;

    if body.reason.trim().len() < MIN_REASON_LEN {
        return Err(GatewayError::Invalid(format!(
            "reason must be at least {MIN_REASON_LEN} characters"
        )));
    }

    let beacon = db::fetch_beacon(&state.db, &beacon_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound("Beacon not found".to_string()))?;

    // One active session per (user, beacon). The partial unique index backs
    // this check against races.
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM breakglass_sessions \
         WHERE user_uid = ? AND target_beacon_id = ? AND status = 'active'",
    )
    .bind(&user.uid)
    .bind(&beacon_id)
    .fetch_optional(&state.db)
    .await?;
    if let Some((id,)) = existing {
        return Err(GatewayError::Conflict(format!(
            "Active breakglass session already exists: {id}"
        )));
    }

    let duration_minutes = body
        .duration_minutes
        .unwrap_or(state.config.breakglass_default_minutes)
        .min(state.config.breakglass_max_minutes)
        .max(1);
    let expires_at = (chrono::Utc::now() + chrono::Duration::minutes(duration_minutes)).to_rfc3339();

    let session_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO breakglass_sessions \
         (id, user_uid, username, email, target_beacon_id, started_at, expires_at, reason) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&session_id)
    .bind(&user.uid)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&beacon_id)
    .bind(now())
    .bind(&expires_at)
    .bind(body.reason.trim())
    .execute(&state.db)
    .await?;

    // Mint the certificate in the same request; roll the session back when
    // issuance fails so no grant outlives its certificate.
    let cert = match state
        .ca
        .sign(&user, &beacon_id, AccessTier::Breakglass, Some(&session_id))
        .await
    {
        Ok(cert) => cert,
        Err(e) => {
            sqlx::query("DELETE FROM breakglass_sessions WHERE id = ?")
                .bind(&session_id)
                .execute(&state.db)
                .await?;
            return Err(e);
        }
    };

    sqlx::query("UPDATE breakglass_sessions SET ssh_cert_serial = ? WHERE id = ?")
        .bind(&cert.serial)
        .bind(&session_id)
        .execute(&state.db)
        .await?;

    let body_bytes = serde_json::to_vec(&body).unwrap_or_default();
    AuditRecord::new(
        &user,
        "breakglass.session_start",
        "POST",
        format!("/api/v1/beacons/{beacon_id}/breakglass"),
    )
    .beacon(&beacon_id)
    .body(&body_bytes)
    .metadata(serde_json::json!({
        "session_id": session_id,
        "reason": body.reason.trim(),
        "duration_minutes": duration_minutes,
        "expires_at": expires_at,
    }))
    .write(&state.db)
    .await?;

    warn!(
        "BREAKGLASS SESSION STARTED: user={} beacon={beacon_id} session={session_id} \
         reason={:?} expires={expires_at}",
        user.username,
        body.reason.trim(),
    );

    Ok(Json(BreakglassResponse {
        session_id,
        expires_at,
        ssh_certificate: cert.certificate,
        ssh_private_key: cert.private_key,
        ssh_user: BREAKGLASS_USER.to_string(),
        beacon_ip: beacon.public_ip,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// `GET /api/v1/breakglass/sessions`
pub async fn list_sessions(
    State(state): State<AppState>,
    user: SupportUser,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Vec<BreakglassSession>>> {
    user.require(AccessTier::Breakglass)?;

    let sessions = match &query.status {
        Some(status) => {
            sqlx::query_as::<_, BreakglassSession>(
                "SELECT id, user_uid, username, target_beacon_id, started_at, expires_at, \
                 ended_at, reason, status, ssh_cert_serial FROM breakglass_sessions \
                 WHERE status = ? ORDER BY started_at DESC LIMIT 100",
            )
            .bind(status)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, BreakglassSession>(
                "SELECT id, user_uid, username, target_beacon_id, started_at, expires_at, \
                 ended_at, reason, status, ssh_cert_serial FROM breakglass_sessions \
                 ORDER BY started_at DESC LIMIT 100",
            )
            .fetch_all(&state.db)
            .await?
        }
    };

    AuditRecord::new(
        &user,
        "breakglass.list_sessions",
        "GET",
        "/api/v1/breakglass/sessions".to_string(),
    )
    .write(&state.db)
    .await?;
    Ok(Json(sessions))
}

/// `POST /api/v1/breakglass/{id}/revoke`
pub async fn revoke_session(
    State(state): State<AppState>,
    user: SupportUser,
    Path(session_id): Path<String>,
    Json(body): Json<BreakglassRevokeRequest>,
) -> Result<Json<serde_json::Value>> {
    user.require(AccessTier::Breakglass)?;

    let session: Option<BreakglassSession> = sqlx::query_as(
        "SELECT id, user_uid, username, target_beacon_id, started_at, expires_at, \
         ended_at, reason, status, ssh_cert_serial FROM breakglass_sessions \
         WHERE id = ? AND status = 'active'",
    )
    .bind(&session_id)
    .fetch_optional(&state.db)
    .await?;
    let session =
        session.ok_or_else(|| GatewayError::NotFound("Active session not found".to_string()))?;

    sqlx::query(
        "UPDATE breakglass_sessions SET status = 'revoked', ended_at = ?, revoked_by = ? \
         WHERE id = ?",
    )
    .bind(now())
    .bind(&user.uid)
    .bind(&session_id)
    .execute(&state.db)
    .await?;

    let body_bytes = serde_json::to_vec(&body).unwrap_or_default();
    AuditRecord::new(
        &user,
        "breakglass.session_revoke",
        "POST",
        format!("/api/v1/breakglass/{session_id}/revoke"),
    )
    .beacon(&session.target_beacon_id)
    .body(&body_bytes)
    .metadata(serde_json::json!({
        "session_id": session_id,
        "revoke_reason": body.reason,
        "original_user": session.user_uid,
    }))
    .write(&state.db)
    .await?;

    warn!(
        "BREAKGLASS SESSION REVOKED: session={session_id} revoked_by={} reason={:?}",
        user.username, body.reason
    );

    Ok(Json(serde_json::json!({
        "status": "revoked",
        "session_id": session_id,
    })))
}

/// Expire every active session past its deadline. Returns how many flipped.
pub async fn expire_due_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE breakglass_sessions SET status = 'expired', ended_at = ? \
         WHERE status = 'active' AND expires_at < ?",
    )
    .bind(now())
    .bind(now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Spawn the once-a-minute expiry sweeper.
pub fn spawn_sweeper(pool: SqlitePool) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SWEEP_INTERVAL).await;
            match expire_due_sessions(&pool).await {
                Ok(0) => {}
                Ok(count) => warn!("auto-expired {count} breakglass session(s)"),
                Err(e) => error!("breakglass sweeper failed: {e}"),
            }
        }
    });
}
