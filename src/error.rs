//! Application error types

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Insufficient data: {available} returns available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("Optimizer failed to converge after {iterations} iterations")]
    Convergence { iterations: usize },

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether the caller may retry the same request after backing off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. } | AppError::TransientNetwork(_)
        )
    }

    /// Stable machine-readable code for the presentation layer
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Storage(_) | AppError::Pool(_) | AppError::Io(_) => "STORAGE_ERROR",
            AppError::Schema(_) => "SCHEMA_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::TransientNetwork(_) => "TRANSIENT_NETWORK_ERROR",
            AppError::Provider(_) => "PROVIDER_ERROR",
            AppError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            AppError::Convergence { .. } => "CONVERGENCE_ERROR",
            AppError::NotFitted => "NOT_FITTED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Serializable error response for the presentation layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        ErrorResponse::from(&err)
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        ErrorResponse::from(self).serialize(serializer)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
