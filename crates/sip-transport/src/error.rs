//! Error types for the transport layer

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport is closed")]
    TransportClosed,

    #[error("Datagram transport needs a destination address")]
    MissingDestination,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse SIP message: {0}")]
    Parse(#[from] sipline_sip_core::Error),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
