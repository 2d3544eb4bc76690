//! Wire parser for SIP messages
//!
//! The grammar follows RFC 3261 section 25 closely enough for what the stack
//! produces and commonly receives: a start line, `Name: value` header lines
//! (folded lines are joined, compact names are expanded), and a body bounded
//! by `Content-Length`. Each rule is a `nom` combinator over the raw bytes.

pub(crate) mod address;
pub(crate) mod header;
pub(crate) mod start_line;
pub(crate) mod uri;
pub(crate) mod whitespace;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until},
    combinator::{all_consuming, map, recognize},
    multi::many0,
    sequence::{pair, terminated, tuple},
    IResult,
};
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::contact::Contact;
use crate::types::headers::Headers;
use crate::types::message::{Request, Response, SipMessage};
use crate::types::method::Method;

use self::header::header_line;
use self::start_line::{start_line, StartLine};
use self::whitespace::{crlf, is_line_end};

// Type alias for parser result
pub type ParseResult<'a, O> = IResult<&'a [u8], O>;

/// Largest body a `Content-Length` header may announce
pub const MAX_BODY_LENGTH: usize = 128 * 1024;

impl SipMessage {
    /// Parse one complete message
    pub fn parse(data: &[u8]) -> Result<SipMessage> {
        let (body, (start, lines)) = message_head(data).map_err(|e| nom_error("message head", e))?;

        let mut fields = HeaderFields::default();
        for (name, value) in lines {
            fields.push(expand_compact(name), &value)?;
        }

        let payload = match fields.content_length {
            Some(len) if len > body.len() => {
                return Err(Error::Parse(format!(
                    "body shorter than Content-Length ({} < {})",
                    body.len(),
                    len
                )));
            }
            Some(len) => &body[..len],
            None => body,
        };
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|_| Error::Parse("body is not UTF-8".into()))?;

        let from = fields.from.ok_or(Error::MissingHeader("From"))?;
        let to = fields.to.ok_or(Error::MissingHeader("To"))?;
        let (cseq, cseq_method) = fields.cseq.ok_or(Error::MissingHeader("CSeq"))?;

        match start {
            StartLine::Status { status_code, reason } => {
                trace!(status_code, cseq, method = %cseq_method, "Parsed SIP response");
                Ok(SipMessage::Response(Response {
                    status_code,
                    reason: reason.to_string(),
                    method: cseq_method,
                    cseq,
                    from,
                    to,
                    contact: fields.contact,
                    headers: fields.headers,
                    content_type: fields.content_type,
                    payload,
                }))
            }
            StartLine::Request { method, uri } => {
                if method != cseq_method {
                    return Err(Error::Parse(format!(
                        "CSeq method {} does not match request method {}",
                        cseq_method, method
                    )));
                }

                trace!(%method, cseq, "Parsed SIP request");
                Ok(SipMessage::Request(Request {
                    method,
                    uri,
                    from,
                    to,
                    contact: fields.contact,
                    cseq,
                    headers: fields.headers,
                    content_type: fields.content_type,
                    payload,
                }))
            }
        }
    }
}

// generic-message = start-line *message-header CRLF [ message-body ]
fn message_head(input: &[u8]) -> ParseResult<(StartLine<'_>, Vec<(&str, String)>)> {
    map(
        tuple((many0(crlf), start_line, many0(header_line), crlf)),
        |(_, start, headers, _)| (start, headers),
    )(input)
}

/// Length of the first complete message in `buffer`
///
/// Returns `Ok(None)` while the header section or the body announced by
/// `Content-Length` is still incomplete. Stream transports use this to cut
/// messages out of a byte stream; a missing `Content-Length` means an empty
/// body there. A `Content-Length` above [`MAX_BODY_LENGTH`] is an error,
/// since the stream can no longer be framed.
pub fn message_length(buffer: &[u8]) -> Result<Option<usize>> {
    let Ok((body, head)) = header_section(buffer) else {
        return Ok(None);
    };
    let body_start = buffer.len() - body.len();

    let (_, lines) = framing_lines(head).map_err(|e| nom_error("header section", e))?;
    let mut content_length = 0usize;
    for (name, value) in lines.into_iter().flatten() {
        if expand_compact(name).eq_ignore_ascii_case("Content-Length") {
            content_length = parse_content_length(&value)?;
        }
    }

    let total = body_start
        .checked_add(content_length)
        .ok_or_else(|| Error::Parse(format!("Content-Length {} overflows", content_length)))?;
    Ok((buffer.len() >= total).then_some(total))
}

/// Header block up to and including the empty line
fn header_section(input: &[u8]) -> ParseResult<&[u8]> {
    alt((
        terminated(recognize(pair(take_until("\r\n\r\n"), tag("\r\n"))), tag("\r\n")),
        terminated(recognize(pair(take_until("\n\n"), tag("\n"))), tag("\n")),
    ))(input)
}

// Header lines of a header block; the start line and anything else that is
// not a header come back as `None`
fn framing_lines(input: &[u8]) -> ParseResult<Vec<Option<(&str, String)>>> {
    all_consuming(many0(alt((
        map(header_line, Some),
        map(terminated(take_till(is_line_end), crlf), |_| None),
    ))))(input)
}

fn parse_content_length(value: &str) -> Result<usize> {
    let (_, len) = header::content_length(value.trim())
        .map_err(|_| Error::Parse(format!("invalid Content-Length: {}", value)))?;
    if len > MAX_BODY_LENGTH {
        return Err(Error::Parse(format!(
            "Content-Length {} exceeds {} bytes",
            len, MAX_BODY_LENGTH
        )));
    }
    Ok(len)
}

fn nom_error(context: &str, err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::Parse(format!("incomplete {}", context)),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let near = &e.input[..e.input.len().min(32)];
            Error::Parse(format!("invalid {} near {:?}", context, String::from_utf8_lossy(near)))
        }
    }
}

#[derive(Default)]
struct HeaderFields {
    headers: Headers,
    from: Option<Contact>,
    to: Option<Contact>,
    contact: Option<Contact>,
    cseq: Option<(u32, Method)>,
    content_type: Option<String>,
    content_length: Option<usize>,
}

impl HeaderFields {
    fn push(&mut self, name: &str, value: &str) -> Result<()> {
        match name.to_ascii_lowercase().as_str() {
            "from" => self.from = Some(Contact::from_header(value)?),
            "to" => self.to = Some(Contact::from_header(value)?),
            "contact" => {
                // Only the first contact is modelled; "*" is a REGISTER wildcard
                if self.contact.is_none() && value != "*" {
                    let (_, (display_name, uri, params)) = address::address(value)
                        .map_err(|_| Error::InvalidUri(value.to_string()))?;
                    self.contact = Some(Contact {
                        display_name,
                        uri,
                        params,
                    });
                }
            }
            "cseq" => {
                let (_, cseq) = header::cseq(value.trim())
                    .map_err(|_| Error::Parse(format!("invalid CSeq: {}", value)))?;
                self.cseq = Some(cseq);
            }
            "content-type" => self.content_type = Some(value.to_string()),
            "content-length" => self.content_length = Some(parse_content_length(value)?),
            _ => self.headers.append(name, value),
        }
        Ok(())
    }
}

fn expand_compact(name: &str) -> &str {
    match name {
        "v" | "V" => "Via",
        "f" | "F" => "From",
        "t" | "T" => "To",
        "i" | "I" => "Call-ID",
        "m" | "M" => "Contact",
        "c" | "C" => "Content-Type",
        "l" | "L" => "Content-Length",
        "k" | "K" => "Supported",
        "o" | "O" => "Event",
        _ => name,
    }
}
