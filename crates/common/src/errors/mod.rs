//! Error types for Strata
//!
//! Provides a single error taxonomy shared by the stores, the router and the gateway:
//! - Validation-class errors (bad dimension, malformed identifier or query) that are fatal
//!   and never retried
//! - Transient store errors that are retried with backoff
//! - HTTP status code mapping and structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    PayloadTooLarge,
    DimensionMismatch,
    InvalidIdentifier,
    MalformedQuery,

    // Store errors (7xxx)
    CollectionNotInitialized,
    StoreUnavailable,
    StoreError,
    ConnectionError,

    // External service errors (8xxx)
    EmbeddingError,
    EmbeddingTimeout,
    NoSourceSucceeded,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::PayloadTooLarge => 1004,
            ErrorCode::DimensionMismatch => 1005,
            ErrorCode::InvalidIdentifier => 1006,
            ErrorCode::MalformedQuery => 1007,

            // Stores (7xxx)
            ErrorCode::CollectionNotInitialized => 7001,
            ErrorCode::StoreUnavailable => 7002,
            ErrorCode::StoreError => 7003,
            ErrorCode::ConnectionError => 7004,

            // External (8xxx)
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::NoSourceSucceeded => 8005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The offending value is never part of the message.
    #[error("Invalid {kind} identifier: {reason}")]
    InvalidIdentifier { kind: String, reason: String },

    #[error("Malformed graph query: {message}")]
    MalformedQuery { message: String },

    // Store errors
    #[error("Collection not initialized: {collection}")]
    CollectionNotInitialized { collection: String },

    #[error("{store} store unavailable: {message}")]
    StoreUnavailable { store: String, message: String },

    #[error("{store} store error: {message}")]
    Store { store: String, message: String },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Query error: no retrievable source succeeded ({details})")]
    NoSourceSucceeded { details: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::InvalidIdentifier { .. } => ErrorCode::InvalidIdentifier,
            AppError::MalformedQuery { .. } => ErrorCode::MalformedQuery,
            AppError::CollectionNotInitialized { .. } => ErrorCode::CollectionNotInitialized,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::Store { .. } => ErrorCode::StoreError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::NoSourceSucceeded { .. } => ErrorCode::NoSourceSucceeded,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::InvalidIdentifier { .. }
            | AppError::MalformedQuery { .. } => StatusCode::BAD_REQUEST,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 500 Internal Server Error
            AppError::DimensionMismatch { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Store { .. } | AppError::EmbeddingError { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::CollectionNotInitialized { .. }
            | AppError::StoreUnavailable { .. }
            | AppError::DatabaseConnection { .. }
            | AppError::NoSourceSucceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::EmbeddingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Validation-class errors indicate a configuration or input bug.
    /// They are never retried and propagate out of the coordinators unchanged.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::PayloadTooLarge { .. }
                | AppError::DimensionMismatch { .. }
                | AppError::InvalidIdentifier { .. }
                | AppError::MalformedQuery { .. }
                | AppError::Configuration { .. }
        )
    }

    /// Transient failures that are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable { .. } | AppError::DatabaseConnection { .. }
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Classify a SeaORM error raised by a store
    pub fn from_db_err(store: &str, err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::ConnectionAcquire(_) | sea_orm::DbErr::Conn(_) => {
                AppError::StoreUnavailable {
                    store: store.to_string(),
                    message: err.to_string(),
                }
            }
            other => AppError::Store {
                store: store.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Classify a SQLx error raised by a store
    pub fn from_sqlx(store: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::StoreUnavailable {
                store: store.to_string(),
                message: err.to_string(),
            },
            other => AppError::Store {
                store: store.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
