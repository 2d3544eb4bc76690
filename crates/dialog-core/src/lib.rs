//! # SIP dialog and transaction coordination for sipline
//!
//! This crate turns fire-and-forget SIP requests into awaitable transactions
//! and groups them into dialogs multiplexed over connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  connect   ┌────────────┐  create_dialog  ┌──────────┐
//! │ Application │───────────▶│ Connection │────────────────▶│  Dialog  │
//! └──────┬──────┘            └─────┬──────┘                 └────┬─────┘
//!        │ run(events)             │ send_message                │ send
//!        ▼                         ▼                             ▼
//! ┌─────────────┐            ┌────────────┐                ┌─────────────┐
//! │  Transport  │◀───────────│  Transport │                │ Transaction │
//! └─────────────┘            └────────────┘                └─────────────┘
//! ```
//!
//! - [`Application`](app::Application): configuration, the
//!   [`DialogFactory`](app::DialogFactory) and the dialplan
//!   [`Router`](routing::Router); pumps transport events.
//! - [`Connection`](connection::Connection): one remote endpoint, owns its
//!   dialogs by Call-ID and propagates transport loss to all of them.
//! - [`Dialog`](dialog::Dialog): request construction, response correlation,
//!   automatic replies and handler dispatch for inbound requests.
//! - [`TransactionHandle`](transaction::TransactionHandle): resolves with the
//!   final response, retransmits over datagram transports, answers digest
//!   challenges and times out after 64*T1.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipline_dialog_core::prelude::*;
//! use sipline_sip_transport::TcpTransport;
//!
//! # async fn example() -> DialogResult<()> {
//! let app = Application::new(DialogConfig::default());
//! let remote = "192.0.2.10:5060".parse().unwrap();
//! let (transport, events) = TcpTransport::connect(remote, None).await?;
//! let transport: Arc<dyn Transport> = Arc::new(transport);
//! tokio::spawn({
//!     let app = app.clone();
//!     let transport = transport.clone();
//!     async move { app.run(transport, events).await }
//! });
//!
//! let dialog = app.connect(transport, remote)?.create_dialog(
//!     "sip:alice@example.com",
//!     "sip:bob@example.com",
//!     DialogOptions::default(),
//! )?;
//! dialog.register_callback("NOTIFY", Callback::from_fn(|_, request| {
//!     println!("NOTIFY: {}", request.payload);
//!     Ok(())
//! }));
//! let response = dialog.subscribe(None, 1800).await?.await?;
//! println!("subscription answered with {}", response.status_code);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod connection;
pub mod dialog;
pub mod errors;
pub mod routing;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_support;

pub use app::{Application, DefaultDialogFactory, DialogFactory, DialogParams};
pub use config::{DialogConfig, TimerSettings};
pub use connection::{Connection, DialogOptions};
pub use dialog::{Callback, CallbackMode, Dialog, OutboundRequest};
pub use errors::{DialogError, DialogResult};
pub use routing::Router;
pub use transaction::{TransactionHandle, TransactionId, TransactionKey, TransactionState};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        Application, Callback, CallbackMode, Connection, DefaultDialogFactory, Dialog, DialogConfig,
        DialogError, DialogFactory, DialogOptions, DialogParams, DialogResult, OutboundRequest, Router,
        TransactionHandle, TransactionKey,
    };
    pub use sipline_sip_core::{Contact, Headers, Method, Request, Response, SipMessage};
    pub use sipline_sip_transport::{Transport, TransportEvent, TransportKind};
}
