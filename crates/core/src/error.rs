//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown profile type: {0}")]
    UnknownProfileType(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid query parameter '{name}': {reason}")]
    InvalidQuery { name: String, reason: String },
}

impl Error {
    pub(crate) fn query(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
