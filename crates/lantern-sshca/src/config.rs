//! CA configuration and per-tier certificate profiles.

use lantern_core::AccessTier;

use crate::error::CaError;

/// Hard ceiling on breakglass certificate validity, regardless of
/// configuration.
pub const BREAKGLASS_VALIDITY_CAP: u64 = 1800;

/// Typed CA configuration.
#[derive(Debug, Clone)]
pub struct CaConfig {
    /// HTTP bind address.
    pub listen: String,
    /// CA private key path; must exist and be readable only by this process.
    pub ca_private_key_path: String,
    /// CA public key path, served for beacon trust bootstrapping.
    pub ca_public_key_path: String,
    /// Certificate validity per tier, in seconds.
    pub validity_diag: u64,
    pub validity_remediate: u64,
    pub validity_breakglass: u64,
    /// Shared SQLite store (also used by the gateway).
    pub database_url: String,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9444".to_string(),
            ca_private_key_path: "/etc/lantern-sshca/ca_key".to_string(),
            ca_public_key_path: "/etc/lantern-sshca/ca_key.pub".to_string(),
            validity_diag: 300,
            validity_remediate: 600,
            validity_breakglass: 1800,
            database_url: "sqlite:///var/lib/lantern/support.db".to_string(),
        }
    }
}

impl CaConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::Config`] for values that fail to parse.
    pub fn from_env() -> Result<Self, CaError> {
        let defaults = Self::default();
        Ok(Self {
            listen: env_or("SSHCA_LISTEN", &defaults.listen),
            ca_private_key_path: env_or("SSHCA_CA_KEY", &defaults.ca_private_key_path),
            ca_public_key_path: env_or("SSHCA_CA_PUB", &defaults.ca_public_key_path),
            validity_diag: parse_var("SSHCA_VALIDITY_DIAG", defaults.validity_diag)?,
            validity_remediate: parse_var("SSHCA_VALIDITY_REMEDIATE", defaults.validity_remediate)?,
            validity_breakglass: parse_var(
                "SSHCA_VALIDITY_BREAKGLASS",
                defaults.validity_breakglass,
            )?,
            database_url: env_or("DATABASE_URL", &defaults.database_url),
        })
    }

    /// Certificate parameters for a tier.
    #[must_use]
    pub fn profile(&self, tier: AccessTier) -> CertProfile {
        match tier {
            AccessTier::Diag => CertProfile {
                validity_seconds: self.validity_diag,
                principals: vec!["wopr-diag".to_string()],
                force_command: Some("/usr/local/bin/wopr-diag-shell".to_string()),
            },
            AccessTier::Remediate => CertProfile {
                validity_seconds: self.validity_remediate,
                principals: vec!["wopr-diag".to_string(), "wopr-remediate".to_string()],
                force_command: Some("/usr/local/bin/wopr-remediate-shell".to_string()),
            },
            AccessTier::Breakglass => CertProfile {
                validity_seconds: self.validity_breakglass.min(BREAKGLASS_VALIDITY_CAP),
                principals: vec![
                    "wopr-diag".to_string(),
                    "wopr-remediate".to_string(),
                    "wopr-breakglass".to_string(),
                    "root".to_string(),
                ],
                force_command: None,
            },
        }
    }
}

/// Parameters a certificate is signed with for one tier.
#[derive(Debug, Clone)]
pub struct CertProfile {
    pub validity_seconds: u64,
    pub principals: Vec<String>,
    pub force_command: Option<String>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, CaError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CaError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_validity_defaults() {
        let c = CaConfig::default();
        assert_eq!(c.profile(AccessTier::Diag).validity_seconds, 300);
        assert_eq!(c.profile(AccessTier::Remediate).validity_seconds, 600);
        assert_eq!(c.profile(AccessTier::Breakglass).validity_seconds, 1800);
    }

    #[test]
    fn test_principals_are_cumulative() {
        let c = CaConfig::default();
        let diag = c.profile(AccessTier::Diag).principals;
        let remediate = c.profile(AccessTier::Remediate).principals;
        let breakglass = c.profile(AccessTier::Breakglass).principals;
        assert_eq!(diag, vec!["wopr-diag"]);
        assert!(diag.iter().all(|p| remediate.contains(p)));
        assert!(remediate.iter().all(|p| breakglass.contains(p)));
        assert!(breakglass.contains(&"root".to_string()));
    }

    #[test]
    fn test_force_command_absent_only_for_breakglass() {
        let c = CaConfig::default();
        assert!(c.profile(AccessTier::Diag).force_command.is_some());
        assert!(c.profile(AccessTier::Remediate).force_command.is_some());
        assert!(c.profile(AccessTier::Breakglass).force_command.is_none());
    }

    #[test]
    fn test_breakglass_validity_hard_cap() {
        let c = CaConfig {
            validity_breakglass: 86_400,
            ..CaConfig::default()
        };
        assert_eq!(
            c.profile(AccessTier::Breakglass).validity_seconds,
            BREAKGLASS_VALIDITY_CAP
        );
    }
}
