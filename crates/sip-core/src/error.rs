//! Error types for message parsing and construction

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Invalid method: {0}")]
    InvalidMethod(String),
}

pub type Result<T> = std::result::Result<T, Error>;
