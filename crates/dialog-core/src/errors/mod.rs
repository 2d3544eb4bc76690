//! Error types for dialog-core
//!
//! Every failure a caller can observe, whether returned directly or delivered
//! through a [`TransactionHandle`](crate::transaction::TransactionHandle), is a
//! [`DialogError`].

pub mod dialog_errors;

pub use dialog_errors::{DialogError, DialogResult};
