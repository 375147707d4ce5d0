//! Pre-approved remediation actions.
//!
//! Actions live in the shared store as command templates with `{name}`-style
//! placeholders. Substituted values are stripped to `[A-Za-z0-9._-]` before
//! they reach a command line, and the action's own `required_tier` gates
//! execution independently of the endpoint tier.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use lantern_core::{AccessTier, SupportUser};

use crate::audit::AuditRecord;
use crate::ca::CertBundle;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::models::{RemediationAction, RemediationRequest, RemediationResponse};
use crate::server::AppState;
use crate::ssh::execute_on_beacon;

const SSH_TIMEOUT: Duration = Duration::from_secs(60);
const REMEDIATE_USER: &str = "wopr-remediate";

/// Strip a template parameter down to `[A-Za-z0-9._-]`.
fn sanitize_param(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Interpolate `{key}` placeholders with sanitized values.
fn render_template(
    template: &str,
    parameters: &std::collections::HashMap<String, String>,
) -> String {
    let mut command = template.to_string();
    for (key, value) in parameters {
        command = command.replace(&format!("{{{key}}}"), &sanitize_param(value));
    }
    command
}

/// `GET /api/v1/remediation/actions`
pub async fn list_actions(
    State(state): State<AppState>,
    user: SupportUser,
) -> Result<Json<Vec<RemediationAction>>> {
    user.require(AccessTier::Remediate)?;

    let actions = sqlx::query_as::<_, RemediationAction>(
        "SELECT * FROM remediation_actions WHERE is_enabled = 1 ORDER BY risk_level, name",
    )
    .fetch_all(&state.db)
    .await?;

    AuditRecord::new(
        &user,
        "remediate.list_actions",
        "GET",
        "/api/v1/remediation/actions".to_string(),
    )
    .write(&state.db)
    .await?;
    Ok(Json(actions))
}

/// `POST /api/v1/beacons/{id}/remediate`
pub async fn execute_remediation(
    State(state): State<AppState>,
    user: SupportUser,
    Path(beacon_id): Path<String>,
    Json(body): Json<RemediationRequest>,
) -> Result<Json<RemediationResponse>> {
    user.require(AccessTier::Remediate)?;

    let action = sqlx::query_as::<_, RemediationAction>(
        "SELECT * FROM remediation_actions WHERE id = ?",
    )
    .bind(&body.action_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| GatewayError::NotFound("Remediation action not found".to_string()))?;

    if !action.is_enabled {
        return Err(GatewayError::Forbidden(
            "Remediation action is disabled".to_string(),
        ));
    }

    // The action's required tier gates independently of the endpoint tier.
    let required = AccessTier::parse(&action.required_tier)
        .ok_or_else(|| GatewayError::Internal(format!("bad tier on action {}", action.id)))?;
    user.require(required)?;

    let beacon = db::fetch_beacon(&state.db, &beacon_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("Beacon {beacon_id} not found")))?;

    let command = render_template(&action.command_template, &body.parameters);

    let cert: CertBundle = state
        .ca
        .sign(&user, &beacon_id, AccessTier::Remediate, None)
        .await?;
    let key = cert.private_key.as_deref().unwrap_or_default();

    let result = execute_on_beacon(
        &beacon.public_ip,
        &cert.certificate,
        key,
        &command,
        REMEDIATE_USER,
        SSH_TIMEOUT,
    )
    .await;

    let succeeded = result.exit_code == 0;
    let body_bytes = serde_json::to_vec(&body).unwrap_or_default();
    AuditRecord::new(
        &user,
        "remediate.execute",
        "POST",
        format!("/api/v1/beacons/{beacon_id}/remediate"),
    )
    .beacon(&beacon_id)
    .body(&body_bytes)
    .status(if succeeded { 200 } else { 500 })
    .metadata(serde_json::json!({
        "action_id": body.action_id,
        "parameters": body.parameters,
        "exit_code": result.exit_code,
        "risk_level": action.risk_level,
    }))
    .write(&state.db)
    .await?;

    let output = if result.stderr.is_empty() {
        result.stdout
    } else {
        format!("{}\n{}", result.stdout, result.stderr)
    };

    Ok(Json(RemediationResponse {
        action_id: body.action_id,
        status: if succeeded { "success" } else { "failed" }.to_string(),
        output,
        executed_at: chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_sanitize_param_strips_injection() {
        assert_eq!(sanitize_param("caddy; rm -rf /"), "caddyrm-rf");
        assert_eq!(sanitize_param("$(reboot)"), "reboot");
        assert_eq!(sanitize_param("lantern-redis"), "lantern-redis");
    }

    #[test]
    fn test_render_template_substitutes_placeholders() {
        let mut params = HashMap::new();
        params.insert("service".to_string(), "caddy".to_string());
        assert_eq!(
            render_template("systemctl restart {service}", &params),
            "systemctl restart caddy"
        );
    }

    #[test]
    fn test_render_template_sanitizes_values() {
        let mut params = HashMap::new();
        params.insert("service".to_string(), "caddy && reboot".to_string());
        assert_eq!(
            render_template("systemctl restart {service}", &params),
            "systemctl restart caddyreboot"
        );
    }

    #[test]
    fn test_render_template_leaves_unknown_placeholders() {
        let params = HashMap::new();
        assert_eq!(
            render_template("docker restart {container}", &params),
            "docker restart {container}"
        );
    }
}
