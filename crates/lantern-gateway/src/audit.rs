//! Append-only audit logging.
//!
//! Every authenticated handler records exactly one row, and does so before
//! its response is returned: a client holding a 2xx may assume the audit row
//! exists.

use axum::extract::{Path, Query, State};
use axum::Json;
use lantern_core::{AccessTier, SupportUser};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::error::{GatewayError, Result};
use crate::models::{AuditLogEntry, BreakglassSession};
use crate::server::AppState;

/// SHA-256 hex digest of a request body, `None` for empty bodies.
#[must_use]
pub fn body_hash(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(body)))
}

/// One audit record in the making.
pub struct AuditRecord<'a> {
    pub user: &'a SupportUser,
    /// Dotted action verb, e.g. `diag.beacon_logs`.
    pub action: &'a str,
    pub target_beacon_id: Option<&'a str>,
    pub method: &'a str,
    pub path: String,
    pub body_hash: Option<String>,
    pub response_status: u16,
    pub started: std::time::Instant,
    pub metadata: serde_json::Value,
}

impl<'a> AuditRecord<'a> {
    /// Start a record for a handler invocation.
    #[must_use]
    pub fn new(user: &'a SupportUser, action: &'a str, method: &'a str, path: String) -> Self {
        Self {
            user,
            action,
            target_beacon_id: None,
            method,
            path,
            body_hash: None,
            response_status: 200,
            started: std::time::Instant::now(),
            metadata: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn beacon(mut self, beacon_id: &'a str) -> Self {
        self.target_beacon_id = Some(beacon_id);
        self
    }

    #[must_use]
    pub fn body(mut self, body: &[u8]) -> Self {
        self.body_hash = body_hash(body);
        self
    }

    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.response_status = status;
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Insert the row. Must be awaited before the handler returns.
    pub async fn write(self, pool: &SqlitePool) -> Result<()> {
        let tier = self
            .user
            .access_tier()
            .map(|t| t.as_str())
            .unwrap_or_default();
        let duration_ms = self.started.elapsed().as_millis() as i64;
        let metadata = if self.metadata.is_null() {
            "{}".to_string()
        } else {
            self.metadata.to_string()
        };

        sqlx::query(
            "INSERT INTO audit_log (timestamp, user_uid, username, email, action, \
             target_beacon_id, access_tier, request_method, request_path, \
             request_body_hash, response_status, duration_ms, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&self.user.uid)
        .bind(&self.user.username)
        .bind(&self.user.email)
        .bind(self.action)
        .bind(self.target_beacon_id)
        .bind(tier)
        .bind(self.method)
        .bind(&self.path)
        .bind(&self.body_hash)
        .bind(i64::from(self.response_status))
        .bind(duration_ms)
        .bind(metadata)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// --- query endpoints (breakglass tier only) ---

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub user_uid: Option<String>,
    #[serde(default)]
    pub beacon_id: Option<String>,
    #[serde(default)]
    pub access_tier: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// `GET /api/v1/audit/logs`
pub async fn query_logs(
    State(state): State<AppState>,
    user: SupportUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    user.require(AccessTier::Breakglass)?;

    if !(1..=1000).contains(&query.limit) || query.offset < 0 {
        return Err(GatewayError::Invalid("limit must be 1-1000".to_string()));
    }

    let mut conditions = Vec::new();
    let mut binds: Vec<String> = Vec::new();
    if let Some(v) = &query.user_uid {
        conditions.push("user_uid = ?");
        binds.push(v.clone());
    }
    if let Some(v) = &query.beacon_id {
        conditions.push("target_beacon_id = ?");
        binds.push(v.clone());
    }
    if let Some(v) = &query.access_tier {
        conditions.push("access_tier = ?");
        binds.push(v.clone());
    }
    if let Some(v) = &query.action {
        conditions.push("action LIKE ?");
        binds.push(format!("%{v}%"));
    }
    if let Some(v) = &query.since {
        conditions.push("timestamp >= ?");
        binds.push(v.clone());
    }
    if let Some(v) = &query.until {
        conditions.push("timestamp <= ?");
        binds.push(v.clone());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT * FROM audit_log {where_clause} ORDER BY timestamp DESC LIMIT ? OFFSET ?"
    );

    let mut q = sqlx::query_as::<_, AuditLogEntry>(&sql);
    for bind in &binds {
        q = q.bind(bind);
    }
    let entries = q
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(entries))
}

/// `GET /api/v1/audit/logs/{id}`
pub async fn get_log_entry(
    State(state): State<AppState>,
    user: SupportUser,
    Path(log_id): Path<i64>,
) -> Result<Json<AuditLogEntry>> {
    user.require(AccessTier::Breakglass)?;

    let entry = sqlx::query_as::<_, AuditLogEntry>("SELECT * FROM audit_log WHERE id = ?")
        .bind(log_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| GatewayError::NotFound("Audit entry not found".to_string()))?;
    Ok(Json(entry))
}

/// `GET /api/v1/audit/sessions` - every breakglass session, for review.
pub async fn list_all_sessions(
    State(state): State<AppState>,
    user: SupportUser,
) -> Result<Json<Vec<BreakglassSession>>> {
    user.require(AccessTier::Breakglass)?;

    let sessions = sqlx::query_as::<_, BreakglassSession>(
        "SELECT id, user_uid, username, target_beacon_id, started_at, expires_at, \
         ended_at, reason, status, ssh_cert_serial FROM breakglass_sessions \
         ORDER BY started_at DESC LIMIT 500",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(sessions))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db;
    use lantern_core::GROUP_DIAG;

    fn user() -> SupportUser {
        SupportUser {
            uid: "u1".to_string(),
            username: "op".to_string(),
            email: "op@example.com".to_string(),
            groups: vec![GROUP_DIAG.to_string()],
        }
    }

    #[test]
    fn test_body_hash_empty_is_none() {
        assert!(body_hash(b"").is_none());
    }

    #[test]
    fn test_body_hash_is_sha256_hex() {
        let hash = body_hash(b"{}").unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(body_hash(b"{}").unwrap(), hash);
    }

    #[tokio::test]
    async fn test_write_inserts_one_row() {
        let pool = db::connect_in_memory().await.unwrap();
        let u = user();
        AuditRecord::new(&u, "diag.list_beacons", "GET", "/api/v1/beacons".to_string())
            .status(200)
            .write(&pool)
            .await
            .unwrap();

        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM audit_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }

    #[tokio::test]
    async fn test_write_records_tier_and_metadata() {
        let pool = db::connect_in_memory().await.unwrap();
        let u = user();
        AuditRecord::new(&u, "remediate.clear-tmp", "POST", "/x".to_string())
            .beacon("b1")
            .body(b"{\"action_id\":\"clear-tmp\"}")
            .metadata(serde_json::json!({"exit_code": 0}))
            .write(&pool)
            .await
            .unwrap();

        let entry = sqlx::query_as::<_, crate::models::AuditLogEntry>(
            "SELECT * FROM audit_log LIMIT 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(entry.access_tier, "diag");
        assert_eq!(entry.target_beacon_id.as_deref(), Some("b1"));
        assert!(entry.request_body_hash.is_some());
        assert!(entry.metadata.contains("exit_code"));
    }
}
