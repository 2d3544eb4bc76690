//! Requests, responses and their wire rendering

use std::fmt;

use crate::types::contact::Contact;
use crate::types::headers::Headers;
use crate::types::method::Method;
use crate::types::uri::SipUri;
use crate::SIP_VERSION;

/// Headers carried as structured fields instead of in [`Headers`]
///
/// The serializer skips these names in the free-form map so a message never
/// renders them twice.
pub(crate) const STRUCTURED_HEADERS: [&str; 6] =
    ["From", "To", "CSeq", "Contact", "Content-Type", "Content-Length"];

fn is_structured(name: &str) -> bool {
    STRUCTURED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Fresh RFC 3261 branch parameter for a Via header
pub fn generate_branch() -> String {
    format!("z9hG4bK{:016x}", rand::random::<u64>())
}

/// A SIP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: SipUri,
    pub from: Contact,
    pub to: Contact,
    pub contact: Option<Contact>,
    pub cseq: u32,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub payload: String,
}

impl Request {
    pub fn new(method: Method, uri: SipUri, from: Contact, to: Contact, cseq: u32) -> Self {
        Self {
            method,
            uri,
            from,
            to,
            contact: None,
            cseq,
            headers: Headers::new(),
            content_type: None,
            payload: String::new(),
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get("Call-ID")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, SIP_VERSION)?;
        write_common(
            f,
            &self.headers,
            &self.from,
            &self.to,
            self.cseq,
            &self.method,
            self.contact.as_ref(),
            self.content_type.as_deref(),
            &self.payload,
        )
    }
}

/// A SIP response
///
/// `method` and `cseq` mirror the CSeq header and are what a dialog uses to
/// find the transaction the response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub reason: String,
    pub method: Method,
    pub cseq: u32,
    pub from: Contact,
    pub to: Contact,
    pub contact: Option<Contact>,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub payload: String,
}

impl Response {
    /// Build a response to `request`, copying its identities and CSeq
    pub fn from_request(
        request: &Request,
        status_code: u16,
        reason: impl Into<String>,
        headers: Headers,
    ) -> Self {
        Self {
            status_code,
            reason: reason.into(),
            method: request.method.clone(),
            cseq: request.cseq,
            from: request.from.clone(),
            to: request.to.clone(),
            contact: None,
            headers,
            content_type: None,
            payload: String::new(),
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get("Call-ID")
    }

    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status_code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_final(&self) -> bool {
        self.status_code >= 200
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", SIP_VERSION, self.status_code, self.reason)?;
        write_common(
            f,
            &self.headers,
            &self.from,
            &self.to,
            self.cseq,
            &self.method,
            self.contact.as_ref(),
            self.content_type.as_deref(),
            &self.payload,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn write_common(
    f: &mut fmt::Formatter<'_>,
    headers: &Headers,
    from: &Contact,
    to: &Contact,
    cseq: u32,
    method: &Method,
    contact: Option<&Contact>,
    content_type: Option<&str>,
    payload: &str,
) -> fmt::Result {
    for (name, value) in headers.iter().filter(|(name, _)| !is_structured(name)) {
        write!(f, "{}: {}\r\n", name, value)?;
    }
    write!(f, "From: {}\r\n", from)?;
    write!(f, "To: {}\r\n", to)?;
    write!(f, "CSeq: {} {}\r\n", cseq, method)?;
    if let Some(contact) = contact {
        write!(f, "Contact: {}\r\n", contact)?;
    }
    if let Some(content_type) = content_type {
        write!(f, "Content-Type: {}\r\n", content_type)?;
    }
    write!(f, "Content-Length: {}\r\n\r\n", payload.len())?;
    f.write_str(payload)
}

/// Either kind of SIP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipMessage {
    Request(Request),
    Response(Response),
}

impl SipMessage {
    pub fn method(&self) -> &Method {
        match self {
            SipMessage::Request(request) => &request.method,
            SipMessage::Response(response) => &response.method,
        }
    }

    pub fn cseq(&self) -> u32 {
        match self {
            SipMessage::Request(request) => request.cseq,
            SipMessage::Response(response) => response.cseq,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(request) => &request.headers,
            SipMessage::Response(response) => &response.headers,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            SipMessage::Request(request) => &request.payload,
            SipMessage::Response(response) => &response.payload,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers().get("Call-ID")
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipMessage::Request(request) => fmt::Display::fmt(request, f),
            SipMessage::Response(response) => fmt::Display::fmt(response, f),
        }
    }
}

impl From<Request> for SipMessage {
    fn from(request: Request) -> Self {
        SipMessage::Request(request)
    }
}

impl From<Response> for SipMessage {
    fn from(response: Response) -> Self {
        SipMessage::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> Request {
        let mut request = Request::new(
            Method::Invite,
            "sip:bob@example.com".parse().unwrap(),
            Contact::from_header("<sip:alice@example.com>;tag=a").unwrap(),
            Contact::from_header("<sip:bob@example.com>").unwrap(),
            7,
        );
        request.headers.append("Via", "SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1");
        request.headers.append("Call-ID", "call-1");
        request.content_type = Some("application/sdp".into());
        request.payload = "v=0\r\n".into();
        request
    }

    #[test]
    fn test_request_rendering() {
        let wire = invite().to_string();
        assert!(wire.starts_with("INVITE sip:bob@example.com SIP/2.0\r\nVia: SIP/2.0/UDP"));
        assert!(wire.contains("CSeq: 7 INVITE\r\n"));
        assert!(wire.contains("Content-Type: application/sdp\r\n"));
        assert!(wire.ends_with("Content-Length: 5\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn test_structured_headers_are_not_duplicated() {
        let mut request = invite();
        request.headers.append("CSeq", "99 BYE");
        let wire = request.to_string();
        assert_eq!(wire.matches("CSeq:").count(), 1);
        assert!(wire.contains("CSeq: 7 INVITE"));
    }

    #[test]
    fn test_response_from_request() {
        let request = invite();
        let mut headers = Headers::new();
        headers.insert("Call-ID", "call-1");
        let response = Response::from_request(&request, 180, "Ringing", headers);

        assert_eq!(response.method, Method::Invite);
        assert_eq!(response.cseq, 7);
        assert!(response.is_provisional());
        assert!(!response.is_final());
        assert!(response.to_string().starts_with("SIP/2.0 180 Ringing\r\n"));
    }

    #[test]
    fn test_generated_branches_carry_magic_cookie() {
        let branch = generate_branch();
        assert!(branch.starts_with("z9hG4bK"));
        assert_ne!(branch, generate_branch());
    }
}
