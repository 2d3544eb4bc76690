//! Recording transport for unit tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sipline_sip_core::{Request, Response, SipMessage};
use sipline_sip_transport::{Error, Result, Transport, TransportKind};

use crate::app::Application;
use crate::config::DialogConfig;

pub(crate) const OPTIONS: &str = "OPTIONS sip:bob@127.0.0.1 SIP/2.0\r\n\
    Via: SIP/2.0/UDP 10.0.0.9:5060;branch=z9hG4bKremote\r\n\
    From: <sip:alice@10.0.0.9>;tag=remote\r\n\
    To: <sip:bob@127.0.0.1>\r\n\
    Call-ID: unit-test-call\r\n\
    CSeq: 1 OPTIONS\r\n\
    Content-Length: 0\r\n\r\n";

#[derive(Debug)]
pub(crate) struct RecordingTransport {
    kind: TransportKind,
    sent: Mutex<Vec<(SipMessage, Option<SocketAddr>)>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<SipMessage> {
        self.sent.lock().iter().map(|(message, _)| message.clone()).collect()
    }

    pub(crate) fn destinations(&self) -> Vec<Option<SocketAddr>> {
        self.sent.lock().iter().map(|(_, destination)| *destination).collect()
    }

    pub(crate) fn sent_requests(&self) -> Vec<Request> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                SipMessage::Request(request) => Some(request),
                SipMessage::Response(_) => None,
            })
            .collect()
    }

    pub(crate) fn sent_responses(&self) -> Vec<Response> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                SipMessage::Response(response) => Some(response),
                SipMessage::Request(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 5060)))
    }

    async fn send_message(&self, message: &SipMessage, destination: Option<SocketAddr>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("send refused")));
        }
        self.sent.lock().push((message.clone(), destination));
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

pub(crate) fn recording_app(kind: TransportKind) -> (Application, Arc<RecordingTransport>) {
    (
        Application::new(DialogConfig::default()),
        Arc::new(RecordingTransport::new(kind)),
    )
}
