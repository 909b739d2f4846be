//! Core error types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by configuration loading and the service registry.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("service already registered: {0}")]
    DuplicateService(String),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: String, value: String },

    #[error("invalid service {id}: {reason}")]
    InvalidService { id: String, reason: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
