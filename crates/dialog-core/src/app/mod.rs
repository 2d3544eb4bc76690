//! Application: the entry point tying transports, connections and dialogs
//!
//! An [`Application`] holds the configuration, the [`DialogFactory`] and the
//! dialplan [`Router`]. [`Application::connect`] hands out one
//! [`Connection`] per remote address and [`Application::run`] pumps a
//! transport's events into them.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipline_dialog_core::prelude::*;
//! use sipline_sip_transport::UdpTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let app = Application::new(DialogConfig::default());
//! let (transport, events) = UdpTransport::bind("0.0.0.0:5060".parse()?, None).await?;
//! let transport: Arc<dyn Transport> = Arc::new(transport);
//!
//! let connection = app.connect(transport.clone(), "192.0.2.10:5060".parse()?)?;
//! let dialog = connection.create_dialog(
//!     "sip:alice@example.com",
//!     "sip:alice@example.com",
//!     DialogOptions::default().with_password("secret"),
//! )?;
//!
//! tokio::spawn({
//!     let app = app.clone();
//!     async move { app.run(transport, events).await }
//! });
//!
//! let response = dialog.register(None, None).await?.await?;
//! println!("{} {}", response.status_code, response.reason);
//! # Ok(())
//! # }
//! ```

pub mod factory;

use std::fmt;
use std::net::SocketAddr;
use std::ptr;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sipline_sip_core::{Headers, Method, Request, Response, SipMessage};
use sipline_sip_transport::{Transport, TransportEvent};

use crate::config::DialogConfig;
use crate::connection::{Connection, DialogOptions};
use crate::errors::{DialogError, DialogResult};
use crate::routing::Router;

pub use factory::{DefaultDialogFactory, DialogFactory, DialogParams};

/// Shared application handle; clones refer to the same application
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

struct ApplicationInner {
    config: Arc<DialogConfig>,
    factory: RwLock<Arc<dyn DialogFactory>>,
    dialplan: RwLock<Router>,
    connections: DashMap<SocketAddr, Connection>,
}

impl Application {
    pub fn new(config: DialogConfig) -> Self {
        Self {
            inner: Arc::new(ApplicationInner {
                config: Arc::new(config),
                factory: RwLock::new(Arc::new(DefaultDialogFactory)),
                dialplan: RwLock::new(Router::default()),
                connections: DashMap::new(),
            }),
        }
    }

    /// Use `factory` for dialogs created from now on
    pub fn with_dialog_factory(self, factory: impl DialogFactory + 'static) -> Self {
        *self.inner.factory.write() = Arc::new(factory);
        self
    }

    /// Route out-of-dialog requests through `router`
    pub fn with_dialplan(self, router: Router) -> Self {
        *self.inner.dialplan.write() = router;
        self
    }

    pub fn config(&self) -> Arc<DialogConfig> {
        self.inner.config.clone()
    }

    pub fn dialog_factory(&self) -> Arc<dyn DialogFactory> {
        self.inner.factory.read().clone()
    }

    pub fn dialplan(&self) -> Router {
        self.inner.dialplan.read().clone()
    }

    /// Connection towards `remote` over `transport`
    ///
    /// A live connection already bound to the same transport and remote is
    /// reused, so every peer of a shared datagram socket maps to exactly one
    /// connection.
    pub fn connect(&self, transport: Arc<dyn Transport>, remote: SocketAddr) -> DialogResult<Connection> {
        if transport.is_closed() {
            return Err(DialogError::ConnectionClosed);
        }

        let cached = self.inner.connections.get(&remote).map(|entry| entry.value().clone());
        if let Some(existing) = cached {
            if !existing.is_closed() && ptr::addr_eq(Arc::as_ptr(existing.transport()), Arc::as_ptr(&transport)) {
                return Ok(existing);
            }
        }

        let connection = Connection::new(self.clone(), transport, remote)?;
        self.inner.connections.insert(remote, connection.clone());
        Ok(connection)
    }

    pub fn connection(&self, remote: SocketAddr) -> Option<Connection> {
        self.inner.connections.get(&remote).map(|entry| entry.value().clone())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub(crate) fn forget_connection(&self, connection: &Connection) {
        self.inner
            .connections
            .remove_if(&connection.remote_addr(), |_, cached| cached.same_as(connection));
    }

    /// Forget `connection` if it is cached and owns no dialogs
    pub(crate) fn forget_idle_connection(&self, connection: &Connection) {
        let removed = self.inner.connections.remove_if(&connection.remote_addr(), |_, cached| {
            cached.same_as(connection) && cached.dialog_count() == 0
        });
        if removed.is_some() {
            debug!(remote = %connection.remote_addr(), "Dropped idle connection");
        }
    }

    /// Cache `connection` again after it was forgotten as idle
    ///
    /// A connection that took the slot meanwhile is replaced only when it
    /// has no dialogs of its own.
    pub(crate) fn remember_connection(&self, connection: &Connection) {
        if connection.is_closed() {
            return;
        }
        let mut cached = self
            .inner
            .connections
            .entry(connection.remote_addr())
            .or_insert_with(|| connection.clone());
        if !cached.same_as(connection) {
            if cached.is_closed() || cached.dialog_count() == 0 {
                *cached = connection.clone();
            } else {
                warn!(remote = %connection.remote_addr(), "Another connection already serves this peer");
            }
        }
    }

    /// Pump transport events until the transport closes
    ///
    /// Messages go to the connection of their source address, which is
    /// created on first contact. Dispatch errors are logged and do not stop
    /// the loop.
    pub async fn run(&self, transport: Arc<dyn Transport>, mut events: mpsc::Receiver<TransportEvent>) -> DialogResult<()> {
        info!(local = ?transport.local_addr().ok(), kind = %transport.kind(), "Application running");

        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::MessageReceived { message, source, .. } => {
                    let connection = match self.connect(transport.clone(), source) {
                        Ok(connection) => connection,
                        Err(e) => {
                            warn!(source = %source, "Dropping message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = self.dispatch(&connection, message).await {
                        warn!(source = %source, "Failed to dispatch message: {}", e);
                    }
                    connection.forget_if_idle();
                }
                TransportEvent::ConnectionLost { remote } => {
                    if let Some(connection) = self.connection(remote) {
                        connection.connection_lost();
                    }
                }
                TransportEvent::Error { error } => warn!("Transport error: {}", error),
                TransportEvent::Closed => {
                    info!("Transport closed, application stopping");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Hand an inbound message to its dialog or to the dialplan
    pub async fn dispatch(&self, connection: &Connection, message: SipMessage) -> DialogResult<()> {
        let known = message
            .call_id()
            .is_some_and(|call_id| connection.dialog(call_id).is_some());
        if known {
            return connection.dispatch(message).await;
        }

        match message {
            SipMessage::Request(request) => self.route_request(connection, request).await,
            SipMessage::Response(response) => {
                debug!(
                    call_id = ?response.call_id(),
                    status = response.status_code,
                    "Discarding response for unknown dialog"
                );
                Ok(())
            }
        }
    }

    async fn route_request(&self, connection: &Connection, request: Request) -> DialogResult<()> {
        let call_id = request
            .call_id()
            .ok_or(DialogError::Message(sipline_sip_core::Error::MissingHeader("Call-ID")))?
            .to_string();
        let user = request.uri.user.clone().unwrap_or_default();
        let dialplan = self.dialplan();

        let Some(route) = dialplan.resolve(&user) else {
            if request.method == Method::Ack {
                debug!(call_id = %call_id, "Ignoring ACK outside of a dialog");
                return Ok(());
            }
            info!(user = %user, method = %request.method, "No route, answering 501");
            return reject(connection, &request, 501, "Not Implemented").await;
        };

        debug!(user = %user, method = %request.method, call_id = %call_id, "Routing request to new dialog");
        let options = DialogOptions {
            call_id: Some(call_id),
            cseq: request.cseq,
            router: Some(dialplan),
            ..Default::default()
        };
        let dialog = connection.create_dialog(&request.to.to_string(), &request.from.to_string(), options)?;
        dialog.register_callback(request.method.as_str(), route);
        dialog.receive_message(request.into()).await
    }

    /// Close every connection
    pub async fn close(&self) -> DialogResult<()> {
        let connections: Vec<Connection> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for connection in connections {
            connection.close().await?;
        }
        self.inner.connections.clear();
        Ok(())
    }
}

async fn reject(connection: &Connection, request: &Request, status_code: u16, reason: &str) -> DialogResult<()> {
    let mut headers = Headers::new();
    for via in request.headers.get_all("Via") {
        headers.append("Via", via);
    }
    if let Some(call_id) = request.call_id() {
        headers.insert("Call-ID", call_id);
    }

    let mut response = Response::from_request(request, status_code, reason, headers);
    response.to.ensure_tag();
    connection.send_message(response.into()).await
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.inner.config)
            .field("connections", &self.inner.connections.len())
            .finish_non_exhaustive()
    }
}
