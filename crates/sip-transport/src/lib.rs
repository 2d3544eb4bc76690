//! SIP transport layer implementation for the sipline stack
//!
//! This crate provides the [`Transport`] abstraction the dialog layer sends
//! through, together with a datagram ([`UdpTransport`]) and a stream
//! ([`TcpTransport`]) implementation. Inbound traffic is reported as
//! [`TransportEvent`]s on an mpsc channel returned when the transport is
//! created.

pub mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::tcp::TcpTransport;
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent, TransportKind};

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Connect a TCP transport to the specified peer
pub async fn connect_tcp(
    addr: std::net::SocketAddr,
) -> Result<(TcpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    TcpTransport::connect(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        bind_udp, connect_tcp, Error, Result, TcpTransport, Transport, TransportEvent,
        TransportKind, UdpTransport,
    };
}
