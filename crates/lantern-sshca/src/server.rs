//! CA HTTP surface: sign, public-key bootstrap, health.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use lantern_core::{AccessTier, SupportUser};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::CaConfig;
use crate::db;
use crate::error::{CaError, Result};
use crate::signer::{CertSigner, SignParams};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<CaConfig>,
    pub signer: Arc<dyn CertSigner>,
}

/// Build the CA router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/sign", post(sign_certificate))
        .route("/api/v1/ca-public-key", get(ca_public_key))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of `POST /api/v1/sign`.
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub beacon_id: String,
    pub tier: String,
    /// When absent, an ephemeral keypair is generated for this issuance.
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub breakglass_session_id: Option<String>,
}

/// Reply of `POST /api/v1/sign`.
#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub certificate: String,
    /// Only present when the CA generated the keypair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub serial: String,
    pub valid_seconds: u64,
    pub principals: Vec<String>,
}

async fn sign_certificate(
    State(state): State<AppState>,
    user: SupportUser,
    Json(body): Json<SignRequest>,
) -> Result<Json<SignResponse>> {
    let tier = AccessTier::parse(&body.tier)
        .ok_or_else(|| CaError::Invalid(format!("Invalid tier: {}", body.tier)))?;

    // Higher tiers inherit lower issuance rights.
    if !user.has_tier(tier) {
        return Err(CaError::Forbidden(format!(
            "User lacks {} for {} tier",
            tier.group(),
            tier
        )));
    }

    // Breakglass certificates exist only inside an active session.
    if tier == AccessTier::Breakglass {
        let session_id = body.breakglass_session_id.as_deref().ok_or_else(|| {
            CaError::Invalid("breakglass_session_id required for breakglass tier".to_string())
        })?;
        if !db::session_is_active(&state.db, session_id).await? {
            return Err(CaError::Forbidden(
                "No active breakglass session found".to_string(),
            ));
        }
    }

    let profile = state.config.profile(tier);

    let (pubkey, private_key) = match &body.public_key {
        Some(key) => (key.clone(), None),
        None => {
            let keypair = state.signer.generate_keypair().await?;
            (keypair.public_key, Some(keypair.private_key))
        }
    };

    let identity = format!(
        "wopr-support-{}-{}-{}",
        user.username, body.beacon_id, tier
    );
    let signed = state
        .signer
        .sign_user_key(SignParams {
            user_pubkey: pubkey,
            identity,
            principals: profile.principals.clone(),
            validity_seconds: profile.validity_seconds,
            force_command: profile.force_command,
        })
        .await?;

    info!(
        "certificate issued: user={} tier={tier} beacon={} serial={} validity={}s",
        user.username, body.beacon_id, signed.serial, profile.validity_seconds
    );

    Ok(Json(SignResponse {
        certificate: signed.certificate,
        private_key,
        serial: signed.serial.to_string(),
        valid_seconds: profile.validity_seconds,
        principals: profile.principals,
    }))
}

#[derive(Debug, Serialize)]
struct PublicKeyBody {
    public_key: String,
}

/// Beacons fetch this for their `TrustedUserCAKeys` file.
async fn ca_public_key(State(state): State<AppState>) -> Result<Json<PublicKeyBody>> {
    let key = std::fs::read_to_string(&state.config.ca_public_key_path)
        .map_err(|e| CaError::KeyUnavailable(format!("CA public key not found: {e}")))?;
    Ok(Json(PublicKeyBody {
        public_key: key.trim().to_string(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ca_ok = std::path::Path::new(&state.config.ca_private_key_path).exists();
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    Json(serde_json::json!({
        "status": if ca_ok && db_ok { "healthy" } else { "degraded" },
        "service": "lantern-sshca",
        "ca_key": if ca_ok { "present" } else { "missing" },
        "database": if db_ok { "connected" } else { "disconnected" },
    }))
}
