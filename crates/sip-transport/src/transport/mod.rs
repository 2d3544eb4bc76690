//! Transport abstraction shared by every concrete transport

pub mod tcp;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use sipline_sip_core::SipMessage;

use crate::error::Result;

/// Wire protocol of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Datagram transport; every send names its destination
    Udp,
    /// Stream transport bound to a single peer
    Tcp,
}

impl TransportKind {
    /// Reliable transports need no request retransmission
    pub fn is_reliable(self) -> bool {
        matches!(self, TransportKind::Tcp)
    }

    pub fn is_datagram(self) -> bool {
        matches!(self, TransportKind::Udp)
    }

    /// Token used in the Via header sent-protocol
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events reported by a transport to its owner
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete SIP message arrived
    MessageReceived {
        message: SipMessage,
        source: SocketAddr,
        destination: SocketAddr,
    },
    /// The peer of a stream transport went away
    ConnectionLost { remote: SocketAddr },
    /// A non-fatal error, e.g. an unparseable datagram
    Error { error: String },
    /// The transport stopped receiving
    Closed,
}

/// Something that can put SIP messages on the wire
///
/// Datagram transports require `destination`; stream transports ignore it and
/// write to their connected peer.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransportKind;

    fn local_addr(&self) -> Result<SocketAddr>;

    async fn send_message(&self, message: &SipMessage, destination: Option<SocketAddr>) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
