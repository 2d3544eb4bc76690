//! Shared fixtures for the dialog-core integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sipline_auth_core::Challenge;
use sipline_dialog_core::prelude::*;
use sipline_sip_transport::{Error, Result};

pub const REMOTE: &str = "192.0.2.10:5060";

/// In-memory transport that records everything sent through it
#[derive(Debug)]
pub struct MockTransport {
    kind: TransportKind,
    sent: Mutex<Vec<SipMessage>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.sent
            .lock()
            .iter()
            .filter_map(|message| match message {
                SipMessage::Request(request) => Some(request.clone()),
                SipMessage::Response(_) => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<Response> {
        self.sent
            .lock()
            .iter()
            .filter_map(|message| match message {
                SipMessage::Response(response) => Some(response.clone()),
                SipMessage::Request(_) => None,
            })
            .collect()
    }

    pub fn requests_of(&self, method: Method) -> Vec<Request> {
        self.requests().into_iter().filter(|r| r.method == method).collect()
    }

    pub fn last_request(&self) -> Request {
        self.requests().pop().expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from(([198, 51, 100, 1], 5060)))
    }

    async fn send_message(&self, message: &SipMessage, _destination: Option<SocketAddr>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An application with one connection towards [`REMOTE`]
pub fn setup(kind: TransportKind) -> (Application, Connection, Arc<MockTransport>) {
    setup_with(kind, DialogConfig::default())
}

pub fn setup_with(kind: TransportKind, config: DialogConfig) -> (Application, Connection, Arc<MockTransport>) {
    let app = Application::new(config);
    let transport = Arc::new(MockTransport::new(kind));
    let connection = app
        .connect(transport.clone(), REMOTE.parse().unwrap())
        .unwrap();
    (app, connection, transport)
}

pub fn alice_dialog(connection: &Connection, password: Option<&str>) -> Dialog {
    let mut options = DialogOptions::default();
    if let Some(password) = password {
        options = options.with_password(password);
    }
    connection
        .create_dialog("sip:alice@example.com", "sip:bob@example.com", options)
        .unwrap()
}

/// Response to `request` the way a peer would send it back
pub fn response_to(request: &Request, status_code: u16, reason: &str) -> Response {
    let mut headers = Headers::new();
    for via in request.headers.get_all("Via") {
        headers.append("Via", via);
    }
    headers.insert("Call-ID", request.call_id().unwrap());

    let mut response = Response::from_request(request, status_code, reason, headers);
    if status_code > 100 {
        response.to.ensure_tag();
    }
    response
}

/// 401 carrying a fresh digest challenge for `realm`
pub fn unauthorized(request: &Request, realm: &str) -> Response {
    let mut response = response_to(request, 401, "Unauthorized");
    response
        .headers
        .insert("WWW-Authenticate", Challenge::new(realm).to_string());
    response
}

/// 407 carrying a fresh digest challenge for `realm`
pub fn proxy_auth_required(request: &Request, realm: &str) -> Response {
    let mut response = response_to(request, 407, "Proxy Authentication Required");
    response
        .headers
        .insert("Proxy-Authenticate", Challenge::new(realm).to_string());
    response
}

/// Inbound in-dialog request from the peer
pub fn peer_request(dialog: &Dialog, method: Method, cseq: u32, payload: &str) -> Request {
    let mut from = dialog.to_details();
    from.set_tag("peer");
    let mut request = Request::new(method, dialog.from_details().uri, from, dialog.from_details(), cseq);
    request
        .headers
        .insert("Via", "SIP/2.0/UDP 192.0.2.10:5060;branch=z9hG4bKpeer");
    request.headers.insert("Call-ID", dialog.call_id());
    request.payload = payload.to_string();
    request
}

/// Await a transaction, failing the test if it hangs
pub async fn resolve(handle: TransactionHandle) -> DialogResult<Response> {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("transaction never completed")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
