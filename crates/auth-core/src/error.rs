//! Error types for authentication operations

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication method not supported: {0}")]
    UnsupportedAuthMethod(String),

    #[error("Missing authentication parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Malformed authentication parameter: {0}")]
    MalformedParameter(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
