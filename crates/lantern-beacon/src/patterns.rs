//! Known-failure taxonomy.
//!
//! A fixed, ordered list of case-insensitive regexes mapping obvious failure
//! modes straight to a preliminary decision, so the common cases never reach
//! the model. First match wins. The matcher is pure: no I/O, no state.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::models::SafetyTier;

/// A single taxonomy entry.
pub struct KnownPattern {
    regex: Regex,
    tier: SafetyTier,
    action: &'static str,
    confidence: f64,
    name: &'static str,
}

/// A taxonomy hit, ready to be turned into a [`crate::models::Decision`].
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    pub tier: SafetyTier,
    pub action: String,
    pub confidence: f64,
    pub name: String,
    pub reasoning: String,
}

// Patterns are hardcoded and verified at development time.
#[allow(clippy::unwrap_used)]
fn build(pattern: &str, tier: SafetyTier, action: &'static str, confidence: f64, name: &'static str) -> KnownPattern {
    KnownPattern {
        regex: RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(256 * 1024)
            .build()
            .unwrap(),
        tier,
        action,
        confidence,
        name,
    }
}

fn known_patterns() -> &'static [KnownPattern] {
    static PATTERNS: OnceLock<Vec<KnownPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            build(
                r"(OOM|out of memory|Cannot allocate memory)",
                SafetyTier::Suggest,
                "check_memory",
                0.9,
                "out_of_memory",
            ),
            build(
                r"(disk full|No space left on device)",
                SafetyTier::Auto,
                "clear_tmp",
                0.95,
                "disk_full",
            ),
            build(
                r"(ECONNREFUSED|Connection refused|connection reset)",
                SafetyTier::Auto,
                "restart_service",
                0.8,
                "connection_refused",
            ),
            build(
                r"(SIGKILL|killed|exit code 137)",
                SafetyTier::Auto,
                "restart_service",
                0.85,
                "process_killed",
            ),
            build(
                r"(permission denied|EACCES|403 Forbidden)",
                SafetyTier::Escalate,
                "investigate_permissions",
                0.7,
                "permission_denied",
            ),
            build(
                r"(unauthorized|invalid token|auth.*fail)",
                SafetyTier::Escalate,
                "investigate_auth_failure",
                0.8,
                "auth_failure",
            ),
            // Match actual certificate errors, not any mention of TLS/SSL.
            build(
                r"(certificate (expired|invalid|error)|SSL_ERROR|CERT_.*ERROR|x509:)",
                SafetyTier::Suggest,
                "check_certificates",
                0.75,
                "ssl_error",
            ),
            build(
                r"(timeout|timed out|ETIMEDOUT)",
                SafetyTier::Auto,
                "restart_service",
                0.6,
                "timeout",
            ),
            build(
                r"(failed to start|service failed|exit.code.[1-9])",
                SafetyTier::Auto,
                "restart_service",
                0.7,
                "service_failed",
            ),
        ]
    })
}

/// Scan `text` against the taxonomy. Returns the first hit, or `None`.
#[must_use]
pub fn match_known(text: &str) -> Option<PatternHit> {
    known_patterns().iter().find_map(|kp| {
        kp.regex.is_match(text).then(|| PatternHit {
            tier: kp.tier,
            action: kp.action.to_string(),
            confidence: kp.confidence,
            name: kp.name.to_string(),
            reasoning: format!("Matched known pattern: {}", kp.name),
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_oom_maps_to_memory_check() {
        let hit = match_known("Out of memory: kill process 1234").unwrap();
        assert_eq!(hit.tier, SafetyTier::Suggest);
        assert_eq!(hit.action, "check_memory");
        assert!((hit.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(hit.name, "out_of_memory");
    }

    #[test]
    fn test_disk_full_is_tier1() {
        let hit = match_known("write failed: No space left on device").unwrap();
        assert_eq!(hit.tier, SafetyTier::Auto);
        assert_eq!(hit.action, "clear_tmp");
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(match_known("CONNECTION REFUSED on port 5432").is_some());
        assert!(match_known("connection refused on port 5432").is_some());
    }

    #[test]
    fn test_first_match_wins() {
        // Mentions both OOM (first entry) and a timeout (later entry).
        let hit = match_known("out of memory while waiting, request timed out").unwrap();
        assert_eq!(hit.name, "out_of_memory");
    }

    #[test]
    fn test_plain_tls_mention_does_not_match() {
        assert!(match_known("TLS handshake completed").is_none());
    }

    #[test]
    fn test_auth_failure_escalates() {
        let hit = match_known("authentication failure for user admin").unwrap();
        assert_eq!(hit.tier, SafetyTier::Escalate);
        assert_eq!(hit.action, "investigate_auth_failure");
    }

    #[test]
    fn test_unmatched_text_returns_none() {
        assert!(match_known("started unit session-42.scope").is_none());
    }

    #[test]
    fn test_matcher_is_restartable() {
        // Two calls over the same input yield identical hits.
        let a = match_known("exit code 137").unwrap();
        let b = match_known("exit code 137").unwrap();
        assert_eq!(a, b);
    }
}
