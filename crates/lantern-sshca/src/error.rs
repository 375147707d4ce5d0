//! Error types for the certificate authority.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lantern_core::AuthError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for CA operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaError {
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

    /// The caller may not be issued this certificate.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Key generation or signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// CA key material is missing or unreadable.
    #[error("CA key unavailable: {0}")]
    KeyUnavailable(String),
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for CaError {
    fn into_response(self) -> Response {
        if let CaError::Auth(auth) = self {
            return auth.into_response();
        }
        let status = match &self {
            CaError::Invalid(_) => StatusCode::BAD_REQUEST,
            CaError::Forbidden(_) => StatusCode::FORBIDDEN,
            CaError::Config(_)
            | CaError::Database(_)
            | CaError::Signing(_)
            | CaError::KeyUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CaError::Auth(_) => StatusCode::FORBIDDEN,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
        });
        (status, body).into_response()
    }
}

/// Result type alias for CA operations.
pub type Result<T> = std::result::Result<T, CaError>;
