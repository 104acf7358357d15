// ============================
// crates/portal-lib/src/error.rs
// ============================
//! Central error types + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures of the TrueNAS administrative API, whichever transport is used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Cannot reach TrueNAS: {0}")]
    Connectivity(String),

    #[error("API key rejected: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by TrueNAS: {0}")]
    Validation(String),

    #[error("Unexpected reply from TrueNAS: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Connectivity(_) => "connectivity",
            ApiError::Auth(_) => "auth",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation",
            ApiError::Protocol(_) => "protocol",
        }
    }
}

/// Errors surfaced by the portal itself
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Backend(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Backend(ApiError::Connectivity(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Backend(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Backend(ApiError::Connectivity(_)) => "NAS_001",
            AppError::Backend(ApiError::Auth(_)) => "NAS_002",
            AppError::Backend(_) => "NAS_003",
            AppError::Config(_) => "CFG_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Backend(ApiError::Connectivity(_)) => {
                "Cannot reach the TrueNAS server".to_string()
            },
            AppError::Backend(_) => "The TrueNAS server rejected the request".to_string(),
            AppError::Config(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
