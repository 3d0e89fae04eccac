//! Core error types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised by repositories and core configuration
#[derive(Error, Debug)]
pub enum AppError {
    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic update lost against a concurrent writer
    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: i32,
        actual: i32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
        }
    }
}
