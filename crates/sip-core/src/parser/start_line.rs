use std::str::{self, FromStr};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_while1, take_while_m_n},
    character::complete::space1,
    combinator::{map, map_res, opt},
    sequence::{preceded, terminated, tuple},
};

use crate::parser::whitespace::{crlf, is_line_end, is_token_char};
use crate::parser::ParseResult;
use crate::types::method::Method;
use crate::types::uri::SipUri;
use crate::SIP_VERSION;

/// First line of a message
#[derive(Debug, PartialEq)]
pub enum StartLine<'a> {
    Request { method: Method, uri: SipUri },
    Status { status_code: u16, reason: &'a str },
}

fn method(input: &[u8]) -> ParseResult<Method> {
    map_res(map_res(take_while1(is_token_char), str::from_utf8), Method::from_str)(input)
}

fn request_uri(input: &[u8]) -> ParseResult<SipUri> {
    map_res(
        map_res(take_till1(|c: u8| c == b' ' || is_line_end(c)), str::from_utf8),
        SipUri::from_str,
    )(input)
}

fn sip_version(input: &[u8]) -> ParseResult<&[u8]> {
    tag(SIP_VERSION)(input)
}

// Status-Code = 3DIGIT
fn status_code(input: &[u8]) -> ParseResult<u16> {
    map_res(
        map_res(take_while_m_n(3, 3, |c: u8| c.is_ascii_digit()), str::from_utf8),
        |code: &str| code.parse::<u16>(),
    )(input)
}

// Reason-Phrase, possibly empty
fn reason_phrase(input: &[u8]) -> ParseResult<&str> {
    map_res(take_till(is_line_end), str::from_utf8)(input)
}

/// Request-Line = Method SP Request-URI SP SIP-Version CRLF
pub fn request_line(input: &[u8]) -> ParseResult<StartLine<'_>> {
    map(
        terminated(tuple((method, space1, request_uri, space1, sip_version)), crlf),
        |(method, _, uri, _, _)| StartLine::Request { method, uri },
    )(input)
}

/// Status-Line = SIP-Version SP Status-Code SP Reason-Phrase CRLF
pub fn status_line(input: &[u8]) -> ParseResult<StartLine<'_>> {
    map(
        terminated(
            tuple((sip_version, space1, status_code, opt(preceded(space1, reason_phrase)))),
            crlf,
        ),
        |(_, _, status_code, reason)| StartLine::Status {
            status_code,
            reason: reason.unwrap_or_default(),
        },
    )(input)
}

pub fn start_line(input: &[u8]) -> ParseResult<StartLine<'_>> {
    alt((status_line, request_line))(input)
}
