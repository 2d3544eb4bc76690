//! # Auth-Core - SIP Digest authentication for sipline
//!
//! This crate builds, parses and renders the header values used by SIP Digest
//! authentication (RFC 2617 MD5 without qop negotiation):
//!
//! - [`Challenge`] is the `WWW-Authenticate` / `Proxy-Authenticate` value a
//!   server sends in a 401/407 response.
//! - [`Credentials`] is the `Authorization` / `Proxy-Authorization` value a
//!   client answers with.
//!
//! ```rust
//! use sipline_auth_core::{Challenge, Credentials};
//!
//! let challenge = Challenge::new("example.com");
//! let header = challenge.to_string();
//! let parsed = Challenge::from_header(&header).unwrap();
//!
//! let credentials = Credentials::from_authenticate_header(
//!     &parsed, "REGISTER", "sip:example.com", "alice", "secret",
//! ).unwrap();
//! assert!(credentials.verify("REGISTER", "secret"));
//! ```

pub mod digest;
pub mod error;
mod parser;

pub use digest::{generate_nonce, md5_digest, AuthScheme, Challenge, Credentials, DEFAULT_ENTROPY};
pub use error::{AuthError, Result};
