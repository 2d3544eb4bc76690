//! Digest challenge and credential records
//!
//! Both records are plain structs with an explicit wire rendering through
//! [`fmt::Display`] and a `from_header` parser. The wire format is the one SIP
//! user agents exchange in `WWW-Authenticate` and `Authorization` headers:
//!
//! ```text
//! Digest realm="R",qop="auth",opaque="O",nonce="N",algorithm=MD5,stale="false"
//! Digest username="U",uri="URI",realm="R",nonce="N",response="RESP"
//! ```

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::trace;

use crate::error::{AuthError, Result};
use crate::parser;

/// Number of random bytes used for generated nonces and opaques
pub const DEFAULT_ENTROPY: usize = 32;

/// Authentication scheme carried in front of the parameter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Digest,
    Other(String),
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Digest => write!(f, "Digest"),
            AuthScheme::Other(scheme) => write!(f, "{}", scheme),
        }
    }
}

impl FromStr for AuthScheme {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("digest") {
            Ok(AuthScheme::Digest)
        } else if s.is_empty() {
            Err(AuthError::UnsupportedAuthMethod(String::new()))
        } else {
            Ok(AuthScheme::Other(s.to_string()))
        }
    }
}

/// MD5 over the `:`-joined parts, rendered as lowercase hex
pub fn md5_digest(parts: &[&str]) -> String {
    format!("{:x}", md5::compute(parts.join(":")))
}

/// Generate a nonce from [`DEFAULT_ENTROPY`] bytes of OS randomness
///
/// The result is hex encoded, so it is always 64 characters long.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; DEFAULT_ENTROPY];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Server challenge sent in `WWW-Authenticate` / `Proxy-Authenticate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: AuthScheme,
    pub realm: String,
    pub qop: String,
    pub opaque: String,
    pub nonce: String,
    pub algorithm: String,
    pub stale: bool,
}

impl Challenge {
    /// Create a Digest challenge for `realm` with fresh opaque and nonce values
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::Digest,
            realm: realm.into(),
            qop: "auth".to_string(),
            opaque: generate_nonce(),
            nonce: generate_nonce(),
            algorithm: "MD5".to_string(),
            stale: false,
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    pub fn with_opaque(mut self, opaque: impl Into<String>) -> Self {
        self.opaque = opaque.into();
        self
    }

    pub fn with_qop(mut self, qop: impl Into<String>) -> Self {
        self.qop = qop.into();
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    /// Parse a `WWW-Authenticate` header value
    ///
    /// Only the Digest scheme is accepted. Parameters the challenge does not
    /// model are ignored, and a missing opaque or nonce is generated the same
    /// way [`Challenge::new`] does.
    pub fn from_header(header: &str) -> Result<Self> {
        let params = parse_digest_params(header)?;

        let mut challenge = Challenge::new(String::new());
        let mut realm = None;
        for (key, value) in params {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "qop" => challenge.qop = value,
                "opaque" if !value.is_empty() => challenge.opaque = value,
                "nonce" if !value.is_empty() => challenge.nonce = value,
                "algorithm" => challenge.algorithm = value,
                "stale" => challenge.stale = value.eq_ignore_ascii_case("true"),
                other => trace!("Ignoring digest challenge parameter {}", other),
            }
        }

        challenge.realm = realm.ok_or(AuthError::MissingParameter("realm"))?;
        Ok(challenge)
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} realm=\"{}\",qop=\"{}\",opaque=\"{}\",nonce=\"{}\",algorithm={},stale=\"{}\"",
            self.scheme, self.realm, self.qop, self.opaque, self.nonce, self.algorithm, self.stale
        )
    }
}

impl FromStr for Challenge {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Challenge::from_header(s)
    }
}

/// Client answer sent in `Authorization` / `Proxy-Authorization`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub uri: String,
    pub realm: String,
    pub nonce: String,
    pub response: String,
}

impl Credentials {
    /// Compute the digest response for a request
    ///
    /// `HA1 = MD5(username:realm:password)`, `HA2 = MD5(method:uri)` and
    /// `response = MD5(HA1:nonce:HA2)`.
    pub fn new(
        method: &str,
        realm: &str,
        username: &str,
        password: &str,
        uri: &str,
        nonce: &str,
    ) -> Self {
        Self {
            username: username.to_string(),
            uri: uri.to_string(),
            realm: realm.to_string(),
            nonce: nonce.to_string(),
            response: compute_response(method, realm, username, password, uri, nonce),
        }
    }

    /// Answer a parsed challenge
    pub fn from_authenticate_header(
        challenge: &Challenge,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        if challenge.scheme != AuthScheme::Digest {
            return Err(AuthError::UnsupportedAuthMethod(challenge.scheme.to_string()));
        }

        Ok(Self::new(method, &challenge.realm, username, password, uri, &challenge.nonce))
    }

    /// Parse an `Authorization` header value
    pub fn from_header(header: &str) -> Result<Self> {
        let mut username = None;
        let mut uri = None;
        let mut realm = None;
        let mut nonce = None;
        let mut response = None;

        for (key, value) in parse_digest_params(header)? {
            match key.to_ascii_lowercase().as_str() {
                "username" => username = Some(value),
                "uri" => uri = Some(value),
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "response" => response = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            username: username.ok_or(AuthError::MissingParameter("username"))?,
            uri: uri.ok_or(AuthError::MissingParameter("uri"))?,
            realm: realm.ok_or(AuthError::MissingParameter("realm"))?,
            nonce: nonce.ok_or(AuthError::MissingParameter("nonce"))?,
            response: response.ok_or(AuthError::MissingParameter("response"))?,
        })
    }

    /// Check the response against the password the server knows for this user
    pub fn verify(&self, method: &str, password: &str) -> bool {
        let expected = compute_response(
            method,
            &self.realm,
            &self.username,
            password,
            &self.uri,
            &self.nonce,
        );
        expected.len() == self.response.len()
            && expected
                .bytes()
                .zip(self.response.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\",uri=\"{}\",realm=\"{}\",nonce=\"{}\",response=\"{}\"",
            self.username, self.uri, self.realm, self.nonce, self.response
        )
    }
}

impl FromStr for Credentials {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Credentials::from_header(s)
    }
}

fn compute_response(
    method: &str,
    realm: &str,
    username: &str,
    password: &str,
    uri: &str,
    nonce: &str,
) -> String {
    let ha1 = md5_digest(&[username, realm, password]);
    let ha2 = md5_digest(&[method, uri]);
    md5_digest(&[&ha1, nonce, &ha2])
}

/// Split `Digest k=v,k="v"` into its parameters
///
/// Commas inside quoted values do not split and surrounding quotes are
/// stripped. The first element that is not `name=value` is reported.
fn parse_digest_params(header: &str) -> Result<Vec<(String, String)>> {
    let (rest, scheme) = parser::auth_scheme(header.trim())
        .map_err(|_| AuthError::UnsupportedAuthMethod(String::new()))?;

    match scheme.parse::<AuthScheme>()? {
        AuthScheme::Digest => {}
        AuthScheme::Other(other) => return Err(AuthError::UnsupportedAuthMethod(other)),
    }

    let (rest, params) = parser::auth_params(rest.trim_start())
        .map_err(|_| AuthError::MalformedParameter(rest.trim().to_string()))?;

    let (_, segment) = parser::next_segment(rest)
        .map_err(|_| AuthError::MalformedParameter(rest.trim().to_string()))?;
    if !segment.trim().is_empty() {
        return Err(AuthError::MalformedParameter(segment.trim().to_string()));
    }

    Ok(params
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}
