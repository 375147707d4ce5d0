//! Error types for the analysis engine.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Invalid configuration at start-up.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Analysis store failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with the record's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Subprocess or filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else that should surface as a 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body for the beacon API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState(_) => StatusCode::BAD_REQUEST,
            EngineError::Config(_)
            | EngineError::Database(_)
            | EngineError::Io(_)
            | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
        });
        (status, body).into_response()
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = EngineError::NotFound("escalation 42".to_string());
        assert_eq!(err.to_string(), "Not found: escalation 42");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = EngineError::InvalidState("already approved".to_string());
        assert!(err.to_string().contains("already approved"));
    }

    #[test]
    fn test_config_error_display() {
        let err = EngineError::Config("SCAN_INTERVAL=\"abc\" is invalid".to_string());
        assert!(err.to_string().starts_with("Invalid configuration"));
    }
}
