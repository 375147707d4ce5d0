//! Gateway configuration from environment variables.

use crate::error::GatewayError;

/// Typed gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP bind address.
    pub listen: String,
    /// Shared SQLite store (also used by the CA).
    pub database_url: String,
    /// Hard cap on breakglass session length.
    pub breakglass_max_minutes: i64,
    /// Session length when the request does not name one.
    pub breakglass_default_minutes: i64,
    /// Base URL of the SSH certificate authority.
    pub ssh_ca_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8443".to_string(),
            database_url: "sqlite:///var/lib/lantern/support.db".to_string(),
            breakglass_max_minutes: 30,
            breakglass_default_minutes: 15,
            ssh_ca_url: "http://127.0.0.1:9444".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for values that fail to parse.
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        Ok(Self {
            listen: env_or("GATEWAY_LISTEN", &defaults.listen),
            database_url: env_or("DATABASE_URL", &defaults.database_url),
            breakglass_max_minutes: parse_var(
                "BREAKGLASS_MAX_MINUTES",
                defaults.breakglass_max_minutes,
            )?,
            breakglass_default_minutes: parse_var(
                "BREAKGLASS_DEFAULT_MINUTES",
                defaults.breakglass_default_minutes,
            )?,
            ssh_ca_url: env_or("SSH_CA_URL", &defaults.ssh_ca_url),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, GatewayError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| GatewayError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}
