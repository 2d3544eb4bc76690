//! Identity records used in From, To and Contact headers

use std::fmt;
use std::str::FromStr;

use nom::combinator::all_consuming;

use crate::error::{Error, Result};
use crate::parser::address::address;
use crate::types::uri::SipUri;

/// A name-addr or addr-spec with header parameters
///
/// ```rust
/// use sipline_sip_core::Contact;
///
/// let mut from = Contact::from_header("\"Alice\" <sip:alice@example.com>").unwrap();
/// assert!(from.tag().is_none());
/// let tag = from.ensure_tag().to_string();
/// assert_eq!(from.ensure_tag(), tag);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub display_name: Option<String>,
    pub uri: SipUri,
    pub params: Vec<(String, Option<String>)>,
}

impl Contact {
    pub fn new(uri: SipUri) -> Self {
        Self {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    /// Parse a From/To/Contact header value or a bare URI
    ///
    /// Without angle brackets every `;param` belongs to the header, not the
    /// URI, as RFC 3261 section 20 requires.
    pub fn from_header(value: &str) -> Result<Self> {
        let (_, (display_name, uri, params)) = all_consuming(address)(value.trim())
            .map_err(|_| Error::InvalidUri(value.to_string()))?;

        Ok(Self {
            display_name,
            uri,
            params,
        })
    }

    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    pub fn tag(&self) -> Option<&str> {
        self.param("tag").flatten()
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        match self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case("tag")) {
            Some(entry) => entry.1 = Some(tag),
            None => self.params.push(("tag".to_string(), Some(tag))),
        }
    }

    /// Return the dialog tag, generating one first when none is set
    pub fn ensure_tag(&mut self) -> &str {
        if self.tag().is_none() {
            self.set_tag(format!("{:08x}", rand::random::<u32>()));
        }
        self.tag().unwrap_or_default()
    }

    /// User part of the URI, if any
    pub fn user(&self) -> Option<&str> {
        self.uri.user.as_deref()
    }
}

impl From<SipUri> for Contact {
    fn from(uri: SipUri) -> Self {
        Contact::new(uri)
    }
}

impl FromStr for Contact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Contact::from_header(s)
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name)?;
        }
        write!(f, "<{}>", self.uri)?;
        for (key, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", key, value)?,
                None => write!(f, ";{}", key)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_addr_with_tag() {
        let contact = Contact::from_header("\"Bob\" <sip:bob@example.com;transport=tcp>;tag=xyz").unwrap();
        assert_eq!(contact.display_name.as_deref(), Some("Bob"));
        assert_eq!(contact.uri.param("transport"), Some(Some("tcp")));
        assert_eq!(contact.tag(), Some("xyz"));
        assert_eq!(contact.to_string(), "\"Bob\" <sip:bob@example.com;transport=tcp>;tag=xyz");
    }

    #[test]
    fn test_addr_spec_params_belong_to_header() {
        let contact = Contact::from_header("sip:alice@example.com;tag=1234").unwrap();
        assert!(contact.uri.params.is_empty());
        assert_eq!(contact.tag(), Some("1234"));
        assert_eq!(contact.user(), Some("alice"));
    }

    #[test]
    fn test_ensure_tag_is_stable() {
        let mut contact = Contact::from_header("<sip:alice@example.com>").unwrap();
        let first = contact.ensure_tag().to_string();
        assert_eq!(first.len(), 8);
        assert_eq!(contact.ensure_tag(), first);

        contact.set_tag("other");
        assert_eq!(contact.tag(), Some("other"));
        assert_eq!(contact.params.len(), 1);
    }

    #[test]
    fn test_unterminated_name_addr() {
        assert!(Contact::from_header("<sip:alice@example.com").is_err());
    }
}
