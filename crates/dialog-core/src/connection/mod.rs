//! Connections
//!
//! A [`Connection`] is one transport endpoint towards one remote address. It
//! owns the dialogs created on it, keyed by Call-ID, and is the single point
//! through which a transport failure reaches all of them.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sipline_sip_core::SipMessage;
use sipline_sip_transport::{Transport, TransportKind};

use crate::app::{Application, DialogParams};
use crate::dialog::Dialog;
use crate::errors::{DialogError, DialogResult};
use crate::routing::Router;

/// Optional parameters of [`Connection::create_dialog`]
#[derive(Debug, Clone, Default)]
pub struct DialogOptions {
    /// Contact URI, defaults to the from URI
    pub contact_uri: Option<String>,
    /// Password used to answer digest challenges
    pub password: Option<String>,
    /// Call-ID, a random UUID when unset
    pub call_id: Option<String>,
    /// CSeq of the last request sent; the first request uses `cseq + 1`
    pub cseq: u32,
    /// Router handed to the dialog factory, a fresh one when unset
    pub router: Option<Router>,
}

impl DialogOptions {
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_contact_uri(mut self, contact_uri: impl Into<String>) -> Self {
        self.contact_uri = Some(contact_uri.into());
        self
    }
}

/// Handle to a connection; clones share the same state
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    app: Application,
    transport: Arc<dyn Transport>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    closed: AtomicBool,
    dialogs: DashMap<String, Dialog>,
}

impl Connection {
    pub(crate) fn new(app: Application, transport: Arc<dyn Transport>, remote_addr: SocketAddr) -> DialogResult<Self> {
        let local_addr = transport.local_addr()?;
        debug!(local = %local_addr, remote = %remote_addr, kind = %transport.kind(), "Creating connection");

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                app,
                transport,
                local_addr,
                remote_addr,
                closed: AtomicBool::new(false),
                dialogs: DashMap::new(),
            }),
        })
    }

    /// Create a dialog and register it under its Call-ID
    ///
    /// The dialog is built by the application's
    /// [`DialogFactory`](crate::app::DialogFactory). A dialog already
    /// registered under the same Call-ID is closed and replaced.
    pub fn create_dialog(&self, from_uri: &str, to_uri: &str, options: DialogOptions) -> DialogResult<Dialog> {
        if self.is_closed() {
            return Err(DialogError::ConnectionClosed);
        }

        let call_id = options.call_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let params = DialogParams {
            app: self.inner.app.clone(),
            from_uri: from_uri.to_string(),
            to_uri: to_uri.to_string(),
            call_id: call_id.clone(),
            connection: self.clone(),
            contact_uri: options.contact_uri,
            password: options.password,
            cseq: options.cseq,
            router: options.router.unwrap_or_default(),
        };
        let dialog = self.inner.app.dialog_factory().create_dialog(params)?;

        if let Some(previous) = self.inner.dialogs.insert(call_id.clone(), dialog.clone()) {
            warn!(call_id = %call_id, "Replacing existing dialog");
            previous.close();
        }
        if self.inner.transport.kind().is_datagram() {
            self.inner.app.remember_connection(self);
        }
        Ok(dialog)
    }

    /// Put a message on the wire towards the remote address
    pub async fn send_message(&self, message: SipMessage) -> DialogResult<()> {
        if self.is_closed() {
            return Err(DialogError::ConnectionClosed);
        }

        let destination = self.inner.transport.kind().is_datagram().then_some(self.inner.remote_addr);
        self.inner.transport.send_message(&message, destination).await?;
        Ok(())
    }

    /// Route an inbound message to its dialog by Call-ID
    ///
    /// Responses nobody waits for are logged and discarded.
    pub async fn dispatch(&self, message: SipMessage) -> DialogResult<()> {
        let call_id = message
            .call_id()
            .ok_or(DialogError::Message(sipline_sip_core::Error::MissingHeader("Call-ID")))?;
        let dialog = self.dialog(call_id).ok_or_else(|| DialogError::DialogNotFound {
            call_id: call_id.to_string(),
        })?;

        match dialog.receive_message(message).await {
            Err(DialogError::UnmatchedResponse { method, cseq }) => {
                debug!(call_id = %dialog.call_id(), %method, cseq, "Discarding unmatched response");
                Ok(())
            }
            other => other,
        }
    }

    /// Close the connection
    ///
    /// Stream transports are closed; a datagram socket is shared with other
    /// peers and stays open. Dialogs still registered lose their connection.
    /// Idempotent.
    pub async fn close(&self) -> DialogResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(remote = %self.inner.remote_addr, "Closing connection");

        if self.inner.transport.kind().is_reliable() {
            if let Err(e) = self.inner.transport.close().await {
                warn!(remote = %self.inner.remote_addr, "Error closing transport: {}", e);
            }
        }
        self.drop_dialogs();
        self.inner.app.forget_connection(self);
        Ok(())
    }

    /// The transport reported the peer gone
    ///
    /// Marks the connection closed, tells every owned dialog and empties the
    /// registry.
    pub fn connection_lost(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        debug!(remote = %self.inner.remote_addr, "Connection lost");
        self.drop_dialogs();
        self.inner.app.forget_connection(self);
    }

    fn drop_dialogs(&self) {
        let dialogs: Vec<Dialog> = self.inner.dialogs.iter().map(|entry| entry.value().clone()).collect();
        self.inner.dialogs.clear();
        for dialog in dialogs {
            dialog.connection_lost();
        }
    }

    /// Remove the dialog registered under `call_id`, if any
    pub fn stop_dialog(&self, call_id: &str) {
        if self.inner.dialogs.remove(call_id).is_some() {
            debug!(call_id = %call_id, "Dialog removed from connection");
            self.forget_if_idle();
        }
    }

    /// Deregister `dialog` unless another dialog took over its Call-ID
    pub(crate) fn release_dialog(&self, dialog: &Dialog) {
        let released = self
            .inner
            .dialogs
            .remove_if(dialog.call_id(), |_, registered| registered.same_as(dialog));
        if released.is_some() {
            self.forget_if_idle();
        }
    }

    /// Drop a datagram connection without dialogs from the application cache
    ///
    /// The socket is shared by every peer, so such a connection holds no
    /// state; the next message from the peer gets a fresh one.
    pub(crate) fn forget_if_idle(&self) {
        if self.inner.transport.kind().is_datagram() {
            self.inner.app.forget_idle_connection(self);
        }
    }

    pub fn dialog(&self, call_id: &str) -> Option<Dialog> {
        self.inner.dialogs.get(call_id).map(|entry| entry.value().clone())
    }

    pub fn dialog_count(&self) -> usize {
        self.inner.dialogs.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn app(&self) -> &Application {
        &self.inner.app
    }

    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("local", &self.inner.local_addr)
            .field("remote", &self.inner.remote_addr)
            .field("kind", &self.inner.transport.kind())
            .field("dialogs", &self.inner.dialogs.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
