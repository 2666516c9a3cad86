//! Application error types.
//!
//! Every failure surfaced to a caller is an `AppError`. It renders itself as
//! the standard `ApiResponse` error envelope with a stable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller did not carry an authenticated identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Engine kind is neither mysql nor postgresql.
    #[error("unsupported database type: {0}")]
    UnsupportedEngine(String),

    /// Unknown registered database id.
    #[error("database not found: {0}")]
    DatabaseNotFound(u64),

    /// Opening or pinging a registered database failed.
    #[error("failed to connect to database: {0}")]
    DatabaseConnection(String),

    /// High-risk SQL blocked by the risk analyzer.
    #[error("SQL rejected: {description}, {suggestion}")]
    RiskRejected {
        description: String,
        suggestion: String,
    },

    /// Driver error while running a statement or reading its rows.
    #[error("failed to execute query: {0}")]
    QueryExecution(String),

    /// The metadata database (registered databases, audit trail) failed.
    #[error("metadata store error: {0}")]
    MetadataStore(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for client handling.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::UnsupportedEngine(_) => "UNSUPPORTED_ENGINE",
            AppError::DatabaseNotFound(_) => "NOT_FOUND",
            AppError::DatabaseConnection(_) => "CONNECTION_ERROR",
            AppError::RiskRejected { .. } => "RISK_REJECTED",
            AppError::QueryExecution(_) => "EXECUTION_ERROR",
            AppError::MetadataStore(_) => "METADATA_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnsupportedEngine(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::DatabaseNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RiskRejected { .. } => StatusCode::FORBIDDEN,
            AppError::QueryExecution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseConnection(_) => StatusCode::BAD_GATEWAY,
            AppError::MetadataStore(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }

        let body = match &self {
            AppError::RiskRejected {
                description,
                suggestion,
            } => ApiResponse::err_with_details(
                self.code(),
                self.to_string(),
                serde_json::json!({
                    "risk": "high",
                    "description": description,
                    "suggestion": suggestion,
                }),
            ),
            _ => ApiResponse::err(self.code(), self.to_string()),
        };

        (status, Json(body)).into_response()
    }
}
