//! Data model for the analysis engine.
//!
//! Persisted rows keep their timestamps as RFC 3339 UTC strings so that
//! lexicographic comparison in SQL matches chronological order.

use serde::{Deserialize, Serialize};

/// Safety tier of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyTier {
    /// Safe to execute without approval.
    #[serde(rename = "tier1_auto")]
    Auto,
    /// Needs human approval; surfaced as an escalation.
    #[serde(rename = "tier2_suggest")]
    Suggest,
    /// Requires human investigation; surfaced as an escalation.
    #[serde(rename = "tier3_escalate")]
    Escalate,
}

impl SafetyTier {
    /// Stable wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyTier::Auto => "tier1_auto",
            SafetyTier::Suggest => "tier2_suggest",
            SafetyTier::Escalate => "tier3_escalate",
        }
    }

    /// Parse a wire name; unknown names map to `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tier1_auto" => Some(SafetyTier::Auto),
            "tier2_suggest" => Some(SafetyTier::Suggest),
            "tier3_escalate" => Some(SafetyTier::Escalate),
            _ => None,
        }
    }
}

impl std::fmt::Display for SafetyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Lifecycle of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl EscalationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Pending => "pending",
            EscalationStatus::Approved => "approved",
            EscalationStatus::Rejected => "rejected",
            EscalationStatus::Expired => "expired",
        }
    }
}

/// Where an error record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    Journal,
    AuditStore,
}

/// A single collected error. Immutable; discarded after the cycle unless it
/// leads to an escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub origin: ErrorOrigin,
    pub service: String,
    pub severity: String,
    pub timestamp: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// A classification decision for one service's errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub tier: SafetyTier,
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
    pub service: String,
    pub error_pattern: String,
}

/// One full analysis pass, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalysisRun {
    pub id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub errors_found: i64,
    pub auto_fixed: i64,
    pub escalated: i64,
    pub summary: String,
}

/// A decision the engine refused to auto-execute, awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Escalation {
    pub id: String,
    pub analysis_run_id: String,
    pub created_at: String,
    pub tier: String,
    pub service: String,
    pub error_summary: String,
    pub proposed_action: String,
    pub confidence: f64,
    pub status: String,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
}

/// Append-only record of an executed Tier-1 action.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AutoAction {
    pub id: String,
    pub analysis_run_id: String,
    pub executed_at: String,
    pub service: String,
    pub action: String,
    pub success: bool,
    pub output: String,
}

/// Response shape of `GET /api/v1/ai/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub ollama_available: bool,
    pub model: String,
    pub last_run: Option<String>,
    pub total_runs: i64,
    pub total_auto_fixes: i64,
    pub total_escalations: i64,
    pub rate_limit_remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_wire_names() {
        assert_eq!(SafetyTier::Auto.as_str(), "tier1_auto");
        assert_eq!(SafetyTier::parse("tier2_suggest"), Some(SafetyTier::Suggest));
        assert_eq!(SafetyTier::parse("tier9_maximum"), None);
    }

    #[test]
    fn test_tier_serde_round_trip() {
        let json = serde_json::to_string(&SafetyTier::Escalate).unwrap_or_default();
        assert_eq!(json, "\"tier3_escalate\"");
        let back: SafetyTier = serde_json::from_str(&json).unwrap_or(SafetyTier::Auto);
        assert_eq!(back, SafetyTier::Escalate);
    }

    #[test]
    fn test_error_record_omits_empty_optionals() {
        let rec = ErrorRecord {
            origin: ErrorOrigin::Journal,
            service: "caddy".to_string(),
            severity: "error".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            message: "boom".to_string(),
            request_path: None,
            response_status: None,
            duration_ms: None,
        };
        let json = serde_json::to_string(&rec).unwrap_or_default();
        assert!(!json.contains("request_path"));
        assert!(json.contains("\"origin\":\"journal\""));
    }
}
