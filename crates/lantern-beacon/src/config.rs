//! Engine configuration from environment variables.
//!
//! Everything is read once at start-up into a typed [`EngineConfig`].
//! Structurally invalid values (a non-integer interval, malformed JSON for
//! the audit-store map) abort start-up rather than being silently defaulted.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::EngineError;

/// Actions the engine may execute without human approval.
pub const TIER1_ALLOWED_ACTIONS: &[&str] = &[
    "restart_service",
    "restart_container",
    "pull_container_image",
    "reload_caddy",
    "clear_tmp",
    "rotate_logs",
    "check_disk_usage",
    "check_memory",
    "dns_flush",
];

/// Substrings that are always rejected regardless of tier.
pub const COMMAND_BLOCKLIST: &[&str] = &[
    "rm -rf",
    "dd if=",
    "mkfs",
    "chmod 777",
    "DROP TABLE",
    "TRUNCATE",
    "DELETE FROM",
    "> /dev/sd",
    "wget -O -",
    "curl | bash",
    "curl | sh",
    "eval(",
    "exec(",
];

/// Units `restart_service` is allowed to touch.
pub const RESTARTABLE_SERVICES: &[&str] = &[
    // Core platform services
    "caddy",
    "lantern-postgresql",
    "lantern-redis",
    "lantern-authentik-server",
    "lantern-authentik-worker",
    // Application services
    "lantern-nextcloud",
    "lantern-collabora",
    "lantern-vaultwarden",
    "lantern-forgejo",
    "lantern-woodpecker",
    "lantern-code-server",
    "lantern-portainer",
    "lantern-openwebui",
    "lantern-nocodb",
    "lantern-n8n",
    // Ops plane
    "lantern-ollama",
    "lantern-beacon-engine",
    "lantern-support-gateway",
    "lantern-dashboard",
    "lantern-mesh-agent",
    "lantern-monitor",
];

/// Typed engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HTTP bind address for the beacon-local API.
    pub listen: String,
    /// Ollama base URL.
    pub ollama_url: String,
    /// Ollama model id.
    pub ollama_model: String,
    /// SQLite path for the analysis store.
    pub db_path: String,
    /// Tier-1 hourly execution budget.
    pub max_auto_actions_per_hour: i64,
    /// Confidence floor for Tier-1 decisions.
    pub min_confidence: f64,
    /// Seconds between scheduled analysis cycles.
    pub scan_interval: Duration,
    /// Service name -> audit-store SQLite URL.
    pub audit_dbs: HashMap<String, String>,
    /// Optional webhook for escalation notifications.
    pub notify_webhook_url: Option<String>,
    /// Optional lighthouse base URL for self-registration.
    pub lighthouse_url: Option<String>,
    /// Registration identity.
    pub beacon_id: String,
    pub beacon_domain: String,
    pub beacon_bundle: String,
    /// Externally reachable URL of this engine, sent on registration.
    pub engine_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8820".to_string(),
            ollama_url: "http://127.0.0.1:11434".to_string(),
            ollama_model: "phi3:mini".to_string(),
            db_path: "/var/lib/lantern/analysis.db".to_string(),
            max_auto_actions_per_hour: 10,
            min_confidence: 0.7,
            scan_interval: Duration::from_secs(300),
            audit_dbs: HashMap::new(),
            notify_webhook_url: None,
            lighthouse_url: None,
            beacon_id: "beacon".to_string(),
            beacon_domain: String::new(),
            beacon_bundle: "standalone".to_string(),
            engine_url: "http://127.0.0.1:8820".to_string(),
        }
    }
}

impl EngineConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for any value that fails to parse.
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = Self::default();

        let max_auto_actions_per_hour =
            parse_var("MAX_AUTO_ACTIONS_PER_HOUR", defaults.max_auto_actions_per_hour)?;
        let min_confidence = parse_var("MIN_CONFIDENCE", defaults.min_confidence)?;
        let scan_interval_secs: u64 = parse_var("SCAN_INTERVAL", 300)?;

        let audit_dbs = match std::env::var("AUDIT_DBS") {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .map_err(|e| EngineError::Config(format!("AUDIT_DBS is not a JSON map: {e}")))?,
            _ => HashMap::new(),
        };

        let listen = env_or("ENGINE_LISTEN", &defaults.listen);
        let engine_url = std::env::var("ENGINE_URL").unwrap_or_else(|_| format!("http://{listen}"));

        Ok(Self {
            ollama_url: env_or("OLLAMA_URL", &defaults.ollama_url),
            ollama_model: env_or("OLLAMA_MODEL", &defaults.ollama_model),
            db_path: env_or("AI_ENGINE_DB", &defaults.db_path),
            max_auto_actions_per_hour,
            min_confidence,
            scan_interval: Duration::from_secs(scan_interval_secs),
            audit_dbs,
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            lighthouse_url: std::env::var("LIGHTHOUSE_URL").ok(),
            beacon_id: env_or("BEACON_ID", &defaults.beacon_id),
            beacon_domain: env_or("BEACON_DOMAIN", &defaults.beacon_domain),
            beacon_bundle: env_or("BEACON_BUNDLE", &defaults.beacon_bundle),
            listen,
            engine_url,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, EngineError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| EngineError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}
