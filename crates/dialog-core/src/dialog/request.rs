//! Parameters for requests sent through a dialog

use sipline_sip_core::{Contact, Headers, Method};

/// A request before the dialog fills in identities, CSeq and routing headers
///
/// Everything left unset falls back to the dialog's own values.
///
/// ```rust
/// use sipline_dialog_core::dialog::OutboundRequest;
/// use sipline_sip_core::Method;
///
/// let request = OutboundRequest::new(Method::Notify)
///     .with_header("Event", "presence")
///     .with_body("application/pidf+xml", "<presence/>");
/// assert_eq!(request.headers.get("event"), Some("presence"));
/// ```
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub to: Option<Contact>,
    pub from: Option<Contact>,
    pub contact: Option<Contact>,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub payload: Option<String>,
}

impl OutboundRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            to: None,
            from: None,
            contact: None,
            headers: Headers::new(),
            content_type: None,
            payload: None,
        }
    }

    pub fn with_to(mut self, to: Contact) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_from(mut self, from: Contact) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Replace the extra headers
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, payload: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self.payload = Some(payload.into());
        self
    }
}

impl From<Method> for OutboundRequest {
    fn from(method: Method) -> Self {
        OutboundRequest::new(method)
    }
}
