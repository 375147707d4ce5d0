//! Read-only diagnostics executed over SSH with diag-tier certificates.
//!
//! Every remote command runs under the forced diagnostic shell; the
//! certificate the CA issues for this tier cannot do anything else. User
//! input that ends up in a remote command line is stripped to a safe
//! character set first.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use lantern_core::{AccessTier, SupportUser};
use serde::Deserialize;

use crate::audit::AuditRecord;
use crate::ca::CertBundle;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::models::{BeaconHealthResponse, BeaconLogsResponse, ServiceStatus};
use crate::server::AppState;
use crate::ssh::{execute_on_beacon, SshResult};

const SSH_TIMEOUT: Duration = Duration::from_secs(30);
const DIAG_USER: &str = "wopr-diag";

const HEALTH_COMMAND: &str = "echo '---UPTIME---' && uptime && \
     echo '---MEM---' && free -m | grep Mem && \
     echo '---DISK---' && df -h / | tail -1 && \
     echo '---SERVICES---' && systemctl list-units 'lantern-*' --no-pager --plain";

const SERVICES_COMMAND: &str =
    "systemctl list-units --type=service --state=running --no-pager --plain";

/// Keep only `[A-Za-z0-9._@-]`, enough for systemd unit names.
fn sanitize_service(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.'))
        .collect()
}

/// Keep only characters a systemd time spec needs.
fn sanitize_since(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | ':' | '.'))
        .collect()
}

async fn diag_exec(
    state: &AppState,
    user: &SupportUser,
    beacon_id: &str,
    command: &str,
) -> Result<SshResult> {
    let beacon = db::fetch_beacon(&state.db, beacon_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("Beacon {beacon_id} not found")))?;

    let cert: CertBundle = state
        .ca
        .sign(user, beacon_id, AccessTier::Diag, None)
        .await?;
    let key = cert.private_key.as_deref().unwrap_or_default();

    Ok(execute_on_beacon(
        &beacon.public_ip,
        &cert.certificate,
        key,
        command,
        DIAG_USER,
        SSH_TIMEOUT,
    )
    .await)
}

/// `GET /api/v1/beacons/{id}/health`
pub async fn beacon_health(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
) -> Result<Json<BeaconHealthResponse>> {
    user.require(AccessTier::Diag)?;

    let result = diag_exec(&state, &user, &beacon_id, HEALTH_COMMAND).await?;

    let mut services = Vec::new();
    let mut in_services = false;
    for line in result.stdout.lines() {
        if line.contains("---SERVICES---") {
            in_services = true;
            continue;
        }
        if in_services && !line.trim().is_empty() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 {
                services.push(ServiceStatus {
                    name: parts[0].to_string(),
                    active: parts[2] == "running",
                    status: parts[2].to_string(),
                });
            }
        }
    }

    let response = BeaconHealthResponse {
        beacon_id: beacon_id.clone(),
        status: if result.exit_code == 0 {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        services,
    };

    AuditRecord::new(
        &user,
        "diag.beacon_health",
        "GET",
        format!("/api/v1/beacons/{beacon_id}/health"),
    )
    .beacon(&beacon_id)
    .write(&state.db)
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default = "default_lines")]
    pub lines: i64,
    #[serde(default)]
    pub since: Option<String>,
}

fn default_lines() -> i64 {
    100
}

/// `GET /api/v1/beacons/{id}/logs`
pub async fn beacon_logs(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<BeaconLogsResponse>> {
    user.require(AccessTier::Diag)?;

    if !(1..=1000).contains(&query.lines) {
        return Err(GatewayError::Invalid("lines must be 1-1000".to_string()));
    }

    let mut command = format!("journalctl --no-pager -n {}", query.lines);
    if let Some(service) = &query.service {
        command.push_str(&format!(" -u {}", sanitize_service(service)));
    }
    if let Some(since) = &query.since {
        command.push_str(&format!(" --since \"{}\"", sanitize_since(since)));
    }

    let result = diag_exec(&state, &user, &beacon_id, &command).await?;
    let lines: Vec<String> = if result.stdout.trim().is_empty() {
        Vec::new()
    } else {
        result.stdout.trim().lines().map(String::from).collect()
    };
    let truncated = lines.len() as i64 >= query.lines;

    AuditRecord::new(
        &user,
        "diag.beacon_logs",
        "GET",
        format!("/api/v1/beacons/{beacon_id}/logs"),
    )
    .beacon(&beacon_id)
    .metadata(serde_json::json!({
        "service": query.service,
        "lines_requested": query.lines,
    }))
    .write(&state.db)
    .await?;

    Ok(Json(BeaconLogsResponse {
        beacon_id,
        service: query.service,
        lines,
        truncated,
    }))
}

/// `GET /api/v1/beacons/{id}/services`
pub async fn beacon_services(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    user.require(AccessTier::Diag)?;

    let result = diag_exec(&state, &user, &beacon_id, SERVICES_COMMAND).await?;

    AuditRecord::new(
        &user,
        "diag.beacon_services",
        "GET",
        format!("/api/v1/beacons/{beacon_id}/services"),
    )
    .beacon(&beacon_id)
    .write(&state.db)
    .await?;

    Ok(Json(serde_json::json!({
        "beacon_id": beacon_id,
        "output": result.stdout,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_service_strips_shell_metacharacters() {
        assert_eq!(sanitize_service("caddy; rm -rf /"), "caddyrm-rf");
        assert_eq!(sanitize_service("lantern-redis.service"), "lantern-redis.service");
        assert_eq!(sanitize_service("getty@tty1"), "getty@tty1");
    }

    #[test]
    fn test_sanitize_since_keeps_time_specs() {
        assert_eq!(sanitize_since("1 hour ago"), "1 hour ago");
        assert_eq!(sanitize_since("2026-01-01 10:00:00"), "2026-01-01 10:00:00");
        assert_eq!(sanitize_since("\"; reboot #"), " reboot ");
    }
}
