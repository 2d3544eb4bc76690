//! Core dialog error type

use sipline_auth_core::AuthError;
use sipline_sip_core::Method;
use thiserror::Error;

/// Result type for dialog operations
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised by transactions, dialogs, connections and the application
///
/// The type is `Clone` because the same teardown error is delivered to every
/// pending transaction of a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogError {
    /// The connection was closed or lost before the operation
    #[error("Connection is closed")]
    ConnectionClosed,

    /// The dialog was closed before the operation
    #[error("Dialog is closed")]
    DialogClosed,

    /// A response arrived for which no transaction is pending
    #[error("No pending transaction for {method} with CSeq {cseq}")]
    UnmatchedResponse { method: Method, cseq: u32 },

    /// The owning dialog was closed locally (graceful teardown)
    #[error("Transaction aborted by dialog close")]
    Aborted,

    /// The underlying connection went away (non-graceful teardown)
    #[error("Connection lost")]
    ConnectionLost,

    /// No final response within 64*T1
    #[error("Transaction {method} with CSeq {cseq} timed out")]
    Timeout { method: Method, cseq: u32 },

    /// The caller cancelled the transaction
    #[error("Transaction cancelled")]
    Cancelled,

    /// A challenge arrived but the dialog has no password
    #[error("Password required for authentication")]
    PasswordRequired,

    /// The authentication attempt budget is exhausted
    #[error("Too many unauthorized attempts for {method}")]
    AuthenticationFailed { method: Method },

    /// No dialog is registered under the call-id
    #[error("Dialog not found: {call_id}")]
    DialogNotFound { call_id: String },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Message error: {0}")]
    Message(#[from] sipline_sip_core::Error),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DialogError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error is a teardown of the dialog or its connection
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            DialogError::Aborted
                | DialogError::ConnectionLost
                | DialogError::ConnectionClosed
                | DialogError::DialogClosed
        )
    }

    /// Whether a teardown was initiated locally rather than by the network
    pub fn is_graceful(&self) -> bool {
        matches!(self, DialogError::Aborted | DialogError::DialogClosed)
    }
}

impl From<sipline_sip_transport::Error> for DialogError {
    fn from(error: sipline_sip_transport::Error) -> Self {
        match error {
            sipline_sip_transport::Error::TransportClosed => DialogError::ConnectionClosed,
            other => DialogError::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl From<toml::de::Error> for DialogError {
    fn from(error: toml::de::Error) -> Self {
        DialogError::configuration(error.to_string())
    }
}
