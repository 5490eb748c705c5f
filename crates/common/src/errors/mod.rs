//! Error types for DataForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Error codes for machine-readable identification
//! - Client/server classification for logging severity

use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resource errors (4xxx)
    ResourceNotFound,
    FileNotFound,
    IdentifierNotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    StorageError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ResourceNotFound => 4002,
            ErrorCode::FileNotFound => 4003,
            ErrorCode::IdentifierNotFound => 4004,

            ErrorCode::Conflict => 5001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::StorageError => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found: {id}")]
    ResourceNotFound { id: String },

    #[error("Resource {resource_id}, file {file} not found")]
    FileNotFound { resource_id: String, file: String },

    #[error("No resource carries {scheme} {value}")]
    IdentifierNotFound { scheme: String, value: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Storage backend error: {message}")]
    Storage { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            AppError::FileNotFound { .. } => ErrorCode::FileNotFound,
            AppError::IdentifierNotFound { .. } => ErrorCode::IdentifierNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Check if this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self.code().as_code() / 1000, 4 | 5)
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Check if this is any kind of not-found error
    pub fn is_not_found(&self) -> bool {
        self.code().as_code() / 1000 == 4
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ResourceNotFound { id: "abc123".into() };
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
        assert!(err.is_not_found());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_duplicate_is_client_error() {
        let err = AppError::Duplicate {
            message: "a.csv already exists".into(),
        };
        assert_eq!(err.code().as_code(), 5001);
        assert!(!err.is_server_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_storage_error_is_server_side() {
        let err: AppError = StorageError::Session("SYS_SOCK_READ_TIMEDOUT".into()).into();
        assert_eq!(err.code(), ErrorCode::StorageError);
        assert!(err.is_server_error());
        assert!(err.to_string().contains("SYS_SOCK_READ_TIMEDOUT"));
    }
}
