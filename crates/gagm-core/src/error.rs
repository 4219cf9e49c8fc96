//! Centralized error types for GAGM.

use thiserror::Error;

/// Main error type for GAGM operations.
#[derive(Error, Debug)]
pub enum GagmError {
    #[error("Invalid type definition '{name}': {reason}")]
    Definition { name: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Unknown type '{0}' in store record")]
    UnknownType(String),

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Graph store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for GAGM operations.
pub type GagmResult<T> = Result<T, GagmError>;

impl GagmError {
    /// Create a definition error.
    pub fn definition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Definition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the error means the requested thing does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
