//! # SIP message model for sipline
//!
//! A deliberately small SIP message layer: just enough structure for the
//! dialog and transaction layers to build requests, correlate responses and
//! put messages on the wire.
//!
//! - [`Method`] - request methods, parsed case-insensitively
//! - [`Headers`] - case-insensitive, multi-valued header map
//! - [`SipUri`] and [`Contact`] - addresses and identity records with tags
//! - [`Request`], [`Response`], [`SipMessage`] - messages and their wire form
//!
//! ```rust
//! use sipline_sip_core::{SipMessage, Method};
//!
//! let raw = "OPTIONS sip:bob@example.com SIP/2.0\r\n\
//!            Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1\r\n\
//!            From: <sip:alice@example.com>;tag=a1\r\n\
//!            To: <sip:bob@example.com>\r\n\
//!            Call-ID: abc\r\n\
//!            CSeq: 1 OPTIONS\r\n\
//!            Content-Length: 0\r\n\r\n";
//!
//! let message = SipMessage::parse(raw.as_bytes()).unwrap();
//! assert_eq!(message.method(), &Method::Options);
//! assert_eq!(message.cseq(), 1);
//! ```

pub mod error;
pub mod parser;
pub mod types;

pub use error::{Error, Result};
pub use parser::{message_length, MAX_BODY_LENGTH};
pub use types::contact::Contact;
pub use types::headers::Headers;
pub use types::message::{generate_branch, Request, Response, SipMessage};
pub use types::method::Method;
pub use types::uri::SipUri;

/// Protocol version written on every start line
pub const SIP_VERSION: &str = "SIP/2.0";
