//! Client for the SSH certificate authority.
//!
//! The gateway never signs anything itself; each remote action requests a
//! fresh, short-lived certificate from the CA, forwarding the operator's
//! identity headers so the CA can do its own tier check.

use std::time::Duration;

use lantern_core::{AccessTier, SupportUser};
use serde::Deserialize;
use serde_json::json;

use crate::error::{GatewayError, Result};

const SIGN_TIMEOUT: Duration = Duration::from_secs(10);

/// Certificate bundle returned by the CA.
#[derive(Debug, Clone, Deserialize)]
pub struct CertBundle {
    pub certificate: String,
    /// Present when the CA generated an ephemeral keypair.
    #[serde(default)]
    pub private_key: Option<String>,
    pub serial: String,
    pub valid_seconds: i64,
    #[serde(default)]
    pub principals: Vec<String>,
}

/// HTTP client for `POST /api/v1/sign`.
#[derive(Debug, Clone)]
pub struct CaClient {
    http: reqwest::Client,
    base_url: String,
}

impl CaClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Request a certificate for `user` at `tier` scoped to `beacon_id`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CertificateAuthority`] for any transport failure or
    /// non-200 answer.
    pub async fn sign(
        &self,
        user: &SupportUser,
        beacon_id: &str,
        tier: AccessTier,
        breakglass_session_id: Option<&str>,
    ) -> Result<CertBundle> {
        let mut body = json!({
            "beacon_id": beacon_id,
            "tier": tier.as_str(),
        });
        if let Some(session_id) = breakglass_session_id {
            body["breakglass_session_id"] = json!(session_id);
        }

        let response = self
            .http
            .post(format!("{}/api/v1/sign", self.base_url))
            .timeout(SIGN_TIMEOUT)
            .header("X-Authentik-UID", &user.uid)
            .header("X-Authentik-Username", &user.username)
            .header("X-Authentik-Email", &user.email)
            .header("X-Authentik-Groups", user.groups.join(","))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::CertificateAuthority(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::CertificateAuthority(format!(
                "CA returned {status}: {text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::CertificateAuthority(format!("bad CA reply: {e}")))
    }
}
