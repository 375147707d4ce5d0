//! Downgrade-only safety validation.
//!
//! Every candidate decision passes through [`validate`] before the engine
//! acts on it, whether it came from the pattern taxonomy or the model. The
//! validator is the single enforcement point for the blocklist, the Tier-1
//! allowlist, and the confidence floor; all other components trust its
//! output. It can only ever lower a decision's tier, never raise it.

use crate::config::{COMMAND_BLOCKLIST, TIER1_ALLOWED_ACTIONS};
use crate::models::{Decision, SafetyTier};

/// Apply the safety rules in order, mutating the decision in place.
pub fn validate(decision: &mut Decision, min_confidence: f64) {
    let action_lower = decision.action.to_lowercase();

    // Rule 1: blocklisted substrings force an escalation with zero trust.
    for blocked in COMMAND_BLOCKLIST {
        if action_lower.contains(&blocked.to_lowercase()) {
            decision.tier = SafetyTier::Escalate;
            decision.confidence = 0.0;
            decision
                .reasoning
                .push_str(" [BLOCKED: contains prohibited command]");
            return;
        }
    }

    // Rule 2: Tier-1 actions must come from the closed allowlist. The
    // action's base token is whatever precedes the first ':' or space.
    if decision.tier == SafetyTier::Auto {
        let base = decision
            .action
            .split([':', ' '])
            .next()
            .unwrap_or_default();
        if !TIER1_ALLOWED_ACTIONS.contains(&base) {
            decision.tier = SafetyTier::Suggest;
            decision
                .reasoning
                .push_str(&format!(" [DOWNGRADED: '{base}' not in tier1 allowlist]"));
        }
    }

    // Rule 3: Tier-1 actions must clear the confidence floor.
    if decision.tier == SafetyTier::Auto && decision.confidence < min_confidence {
        decision.tier = SafetyTier::Suggest;
        decision.reasoning.push_str(&format!(
            " [DOWNGRADED: confidence {:.2} below threshold {min_confidence}]",
            decision.confidence
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(tier: SafetyTier, action: &str, confidence: f64) -> Decision {
        Decision {
            tier,
            action: action.to_string(),
            confidence,
            reasoning: "model analysis".to_string(),
            service: "caddy".to_string(),
            error_pattern: "unknown".to_string(),
        }
    }

    #[test]
    fn test_blocklist_overrides_confident_auto_decision() {
        let mut d = decision(SafetyTier::Auto, "rm -rf /var/log", 0.95);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Escalate);
        assert!((d.confidence - 0.0).abs() < f64::EPSILON);
        assert!(d.reasoning.contains("BLOCKED"));
    }

    #[test]
    fn test_blocklist_is_case_insensitive() {
        let mut d = decision(SafetyTier::Suggest, "run drop table users", 0.9);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Escalate);
    }

    #[test]
    fn test_unlisted_action_downgrades_to_suggest() {
        let mut d = decision(SafetyTier::Auto, "resize_volume", 0.9);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Suggest);
        assert!(d.reasoning.contains("not in tier1 allowlist"));
    }

    #[test]
    fn test_base_token_splits_on_colon() {
        let mut d = decision(SafetyTier::Auto, "restart_service:caddy", 0.9);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Auto);
    }

    #[test]
    fn test_base_token_splits_on_space() {
        let mut d = decision(SafetyTier::Auto, "restart_service caddy", 0.9);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Auto);
    }

    #[test]
    fn test_low_confidence_downgrades() {
        let mut d = decision(SafetyTier::Auto, "restart_service", 0.5);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Suggest);
        assert!(d.reasoning.contains("below threshold"));
    }

    #[test]
    fn test_confidence_at_floor_passes() {
        let mut d = decision(SafetyTier::Auto, "restart_service", 0.7);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Auto);
    }

    #[test]
    fn test_validator_never_upgrades() {
        let mut d = decision(SafetyTier::Escalate, "restart_service", 0.99);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Escalate);

        let mut d = decision(SafetyTier::Suggest, "check_memory", 0.99);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Suggest);
    }

    #[test]
    fn test_suggest_tier_skips_allowlist_and_floor() {
        let mut d = decision(SafetyTier::Suggest, "tune_kernel_params", 0.1);
        validate(&mut d, 0.7);
        assert_eq!(d.tier, SafetyTier::Suggest);
        assert_eq!(d.reasoning, "model analysis");
    }
}
