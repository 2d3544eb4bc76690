//! SIP dialogs
//!
//! A [`Dialog`] is one Call-ID worth of conversation on a
//! [`Connection`](crate::connection::Connection). It builds outbound requests,
//! correlates responses with their transactions, answers inbound requests and
//! hands them to the registered [`Callback`]s.

pub mod callbacks;
pub mod dialog_impl;
pub mod request;

pub use callbacks::{AsyncHandler, Callback, CallbackMode, SyncHandler};
pub use dialog_impl::Dialog;
pub(crate) use dialog_impl::WeakDialog;
pub use request::OutboundRequest;
