//! Core error types for restwise-core.
//!
//! Errors are grouped by how the caller is expected to react: `NotFound` and
//! `InvalidInput` are surfaced to the user, `Unavailable` is recovered from
//! locally by the rest engine and only shows up as a lowered confidence.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown exercise or user. No fallback.
    NotFound,
    /// A collaborator could not be reached.
    Unavailable,
    /// Rejected before any computation.
    InvalidInput,
    /// Configuration, IO and serialization failures.
    Internal,
}

/// Core error type for restwise-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Lookup of an exercise or user failed
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// History or catalogue service could not be reached
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn exercise_not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: "exercise",
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::Config(_) | CoreError::Io(_) | CoreError::Json(_) => ErrorKind::Internal,
        }
    }
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Set numbers start at 1
    #[error("set number must be at least 1")]
    NonPositiveSetNumber,

    /// RPE outside the 1-10 scale
    #[error("perceived effort {0} is outside the 1-10 scale")]
    EffortOutOfRange(u8),

    /// Negative or non-finite load
    #[error("weight {0} kg is not a valid load")]
    InvalidWeight(f64),

    /// Blank user or exercise id
    #[error("{0} must not be empty")]
    EmptyIdentifier(&'static str),

    /// Alert checkpoints are seconds from start, so zero is meaningless
    #[error("alert checkpoints must be positive")]
    InvalidCheckpoint,

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Key does not exist in the document
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_taxonomy() {
        assert_eq!(CoreError::exercise_not_found("squat").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::Unavailable("timeout".into()).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            CoreError::from(ValidationError::NonPositiveSetNumber).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            CoreError::from(ConfigError::UnknownKey("x".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = CoreError::exercise_not_found("zercher-squat");
        assert_eq!(err.to_string(), "exercise not found: zercher-squat");
    }
}
