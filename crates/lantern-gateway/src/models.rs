//! Request/response models for the gateway API.

use serde::{Deserialize, Serialize};

// --- registry ---

/// Registration payload a beacon sends on start-up.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BeaconRegistration {
    pub beacon_id: String,
    pub domain: String,
    pub ai_engine_url: String,
    /// Auto-detected from the request when absent.
    #[serde(default)]
    pub public_ip: Option<String>,
    pub bundle_id: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Periodic heartbeat payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BeaconHeartbeat {
    pub beacon_id: String,
    /// "running", "stopped", or "error".
    pub ai_engine_status: String,
    #[serde(default)]
    pub services_healthy: i64,
    #[serde(default)]
    pub services_total: i64,
}

/// Full registry row, remediate-tier reads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BeaconInfo {
    pub beacon_id: String,
    pub domain: String,
    pub ai_engine_url: String,
    pub public_ip: String,
    pub bundle_id: String,
    pub version: String,
    pub registered_at: String,
    pub last_seen: String,
    pub status: String,
}

/// Summary row, diagnostic-tier reads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BeaconSummary {
    pub beacon_id: String,
    pub domain: String,
    pub public_ip: String,
    pub status: String,
}

// --- diagnostics ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub active: bool,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconHealthResponse {
    pub beacon_id: String,
    pub status: String,
    #[serde(default)]
    pub services: Vec<ServiceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconLogsResponse {
    pub beacon_id: String,
    pub service: Option<String>,
    pub lines: Vec<String>,
    pub truncated: bool,
}

// --- remediation ---

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RemediationAction {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub command_template: String,
    pub required_tier: String,
    pub is_enabled: bool,
    pub risk_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemediationRequest {
    pub action_id: String,
    #[serde(default)]
    pub parameters: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationResponse {
    pub action_id: String,
    pub status: String,
    pub output: String,
    pub executed_at: String,
}

// --- breakglass ---

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakglassRequest {
    pub reason: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakglassResponse {
    pub session_id: String,
    pub expires_at: String,
    pub ssh_certificate: String,
    /// Present when the CA generated an ephemeral keypair for this session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_private_key: Option<String>,
    pub ssh_user: String,
    pub beacon_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BreakglassSession {
    pub id: String,
    pub user_uid: String,
    pub username: String,
    pub target_beacon_id: String,
    pub started_at: String,
    pub expires_at: String,
    pub ended_at: Option<String>,
    pub reason: String,
    pub status: String,
    pub ssh_cert_serial: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakglassRevokeRequest {
    #[serde(default = "default_revoke_reason")]
    pub reason: String,
}

fn default_revoke_reason() -> String {
    "Manual revocation".to_string()
}

// --- audit ---

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_uid: String,
    pub username: String,
    pub email: String,
    pub action: String,
    pub target_beacon_id: Option<String>,
    pub access_tier: String,
    pub request_method: String,
    pub request_path: String,
    pub request_body_hash: Option<String>,
    pub response_status: i64,
    pub duration_ms: i64,
    pub metadata: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_defaults_version() {
        let reg: BeaconRegistration = serde_json::from_str(
            r#"{"beacon_id":"b1","domain":"b1.example.com",
                "ai_engine_url":"http://b1:8820","bundle_id":"standard"}"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(reg.version, "1.0.0");
        assert!(reg.public_ip.is_none());
    }

    #[test]
    fn test_breakglass_response_hides_absent_key() {
        let resp = BreakglassResponse {
            session_id: "s1".to_string(),
            expires_at: "2026-01-01T00:20:00Z".to_string(),
            ssh_certificate: "ssh-ed25519-cert ...".to_string(),
            ssh_private_key: None,
            ssh_user: "wopr-breakglass".to_string(),
            beacon_ip: "203.0.113.7".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap_or_default();
        assert!(!json.contains("ssh_private_key"));
    }
}
