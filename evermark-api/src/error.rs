//! Error Types for the Evermark API
//!
//! - `ErrorCode` categorizes failures and maps them to HTTP status codes
//! - `ApiError` is the `{error, message}` body every endpoint returns on error
//! - `From` conversions for domain, database and JSON errors
//!
//! The leaderboard read path never forwards these codes to clients; it
//! collapses every failure into [`ApiError::temporarily_unavailable`].

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use evermark_core::EvermarkError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks a valid admin API key
    Unauthorized,

    /// Key is valid but not allowed to trigger runs
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    ValidationFailed,

    InvalidInput,

    InvalidRange,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Another aggregation run holds the season lease
    WriteConflict,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    InternalError,

    DatabaseError,

    /// Season epoch/period or server configuration is invalid
    ConfigurationError,

    /// Vote ledger or item catalog unreachable
    SourceUnavailable,

    ConnectionPoolExhausted,

    /// Public read path failure; hides the cause from clients
    TemporarilyUnavailable,

    Timeout,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::InvalidRange => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::WriteConflict => StatusCode::CONFLICT,

            ErrorCode::SourceUnavailable
            | ErrorCode::ConnectionPoolExhausted
            | ErrorCode::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError | ErrorCode::DatabaseError | ErrorCode::ConfigurationError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::WriteConflict => "An aggregation run for this season is already in progress",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ConfigurationError => "Server configuration is invalid",
            ErrorCode::SourceUnavailable => "Vote source is unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
            ErrorCode::TemporarilyUnavailable => "Leaderboard is temporarily unavailable",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error body: `{"error": "WRITE_CONFLICT", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    #[serde(rename = "error")]
    pub code: ErrorCode,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be between {} and {}", field, min, max),
        )
    }

    pub fn write_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WriteConflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    /// The only error the public read path exposes.
    pub fn temporarily_unavailable() -> Self {
        Self::from_code(ErrorCode::TemporarilyUnavailable)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<EvermarkError> for ApiError {
    fn from(err: EvermarkError) -> Self {
        match &err {
            EvermarkError::InvalidConfiguration { reason } => {
                tracing::error!(error = %err, "Configuration error");
                ApiError::configuration_error(reason.clone())
            }
            EvermarkError::SourceUnavailable { .. } => ApiError::source_unavailable(err.to_string()),
            EvermarkError::WriteConflict { .. } => ApiError::write_conflict(err.to_string()),
            EvermarkError::Timeout { operation, .. } => ApiError::timeout(operation),
            EvermarkError::Validation(inner) => ApiError::validation_failed(inner.to_string()),
            EvermarkError::DanglingReference { .. } => ApiError::internal_error(err.to_string()),
            EvermarkError::Storage(inner) => {
                tracing::error!(error = %inner, "Storage error");
                ApiError::database_error(inner.to_string())
            }
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ApiError::database_error("Database operation failed")
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);
        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::source_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::invalid_input(format!("Invalid query parameters: {}", err.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use evermark_core::{StorageError, ValidationError};

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::WriteConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::SourceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ErrorCode::TemporarilyUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorCode::ConfigurationError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_error_mapping() {
        let conflict: ApiError = EvermarkError::WriteConflict {
            season: 2,
            holder: "cli".to_string(),
        }
        .into();
        assert_eq!(conflict.code, ErrorCode::WriteConflict);

        let unavailable: ApiError = EvermarkError::source_unavailable("vote ledger", "down").into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let config: ApiError = EvermarkError::invalid_configuration("epoch in future").into();
        assert_eq!(config.code, ErrorCode::ConfigurationError);
        assert!(config.message.contains("epoch"));

        let validation: ApiError = EvermarkError::from(ValidationError::InvalidValue {
            field: "season".to_string(),
            reason: "must be >= 1".to_string(),
        })
        .into();
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);

        let storage: ApiError = EvermarkError::from(StorageError::WriteFailed {
            season: 1,
            reason: "disk".to_string(),
        })
        .into();
        assert_eq!(storage.code, ErrorCode::DatabaseError);

        let timeout: ApiError = EvermarkError::Timeout {
            operation: "reconcile".to_string(),
            elapsed_ms: 5,
        }
        .into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_error_body_shape() -> Result<(), serde_json::Error> {
        let err = ApiError::write_conflict("season 3 is being aggregated");
        let json = serde_json::to_value(&err)?;
        assert_eq!(json["error"], "WRITE_CONFLICT");
        assert_eq!(json["message"], "season 3 is being aggregated");
        assert!(json.get("details").is_none());

        let back: ApiError = serde_json::from_value(json)?;
        assert_eq!(back, err);
        Ok(())
    }

    #[test]
    fn test_temporarily_unavailable_body() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(ApiError::temporarily_unavailable())?;
        assert_eq!(json["error"], "TEMPORARILY_UNAVAILABLE");
        Ok(())
    }
}
