//! Error types for the support gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lantern_core::AuthError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for gateway operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// Invalid configuration at start-up.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Authentication or authorization failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Shared-store failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request failed validation.
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// The caller is authenticated but this operation is not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The named target does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A beacon's analysis engine could not be reached.
    #[error("Beacon unreachable: {0}")]
    BeaconUnreachable(String),

    /// The certificate authority refused or failed an issuance.
    #[error("Certificate authority error: {0}")]
    CertificateAuthority(String),

    /// A downstream service answered with an error we pass through.
    #[error("Upstream returned {0}")]
    Upstream(u16, String),

    /// Anything else that should surface as a 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl GatewayError {
    /// HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(AuthError::MissingHeaders) => StatusCode::UNAUTHORIZED,
            GatewayError::Auth(_) | GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Invalid(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::BeaconUnreachable(_) | GatewayError::CertificateAuthority(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Upstream(code, _) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Config(_) | GatewayError::Database(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // Auth errors keep their own body shape from lantern-core.
        if let GatewayError::Auth(auth) = self {
            return auth.into_response();
        }
        let status = self.status();
        let message = match self {
            GatewayError::Upstream(_, body) => body,
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error: message,
            status: status.as_u16(),
        });
        (status, body).into_response()
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::NotFound("beacon".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Conflict("session".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GatewayError::BeaconUnreachable("b1".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Auth(AuthError::MissingHeaders).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_upstream_passes_code_through() {
        assert_eq!(
            GatewayError::Upstream(404, "gone".into()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
