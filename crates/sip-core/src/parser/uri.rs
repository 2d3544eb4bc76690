//! SIP-URI = scheme ":" [ userinfo "@" ] hostport uri-parameters [ "?" headers ]

use nom::{
    branch::alt,
    bytes::complete::{take_till1, take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::types::uri::SipUri;

/// `name[=value]` as found in URI and header parameter lists
pub type Param = (String, Option<String>);

fn scheme(input: &str) -> IResult<&str, &str> {
    terminated(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '+'), char(':'))(input)
}

// userinfo = ( user / telephone-subscriber ) [ ":" password ] "@"
fn userinfo(input: &str) -> IResult<&str, &str> {
    terminated(
        take_till1(|c: char| matches!(c, '@' | ';' | '?' | '<' | '>') || c.is_whitespace()),
        char('@'),
    )(input)
}

// host = hostname / IPv4address / IPv6reference
fn host(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(char('['), take_till1(|c: char| c == ']'), char(']'))),
        take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')),
    ))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, |port: &str| port.parse::<u16>()))(input)
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')' | '%' | '[' | ']' | '/' | ':' | '&' | '+' | '$'
        )
}

// uri-parameter = pname [ "=" pvalue ]
fn uri_param(input: &str) -> IResult<&str, Param> {
    map(
        pair(take_while1(is_param_char), opt(preceded(char('='), take_while(is_param_char)))),
        |(name, value): (&str, Option<&str>)| (name.to_string(), value.map(str::to_string)),
    )(input)
}

fn uri_headers(input: &str) -> IResult<&str, &str> {
    preceded(char('?'), take_while1(|c: char| c != '>' && !c.is_whitespace()))(input)
}

/// Scheme, user and hostport, without parameters
///
/// This is the addr-spec form of From/To/Contact values written without
/// angle brackets, where any `;param` that follows belongs to the header.
pub fn uri_address(input: &str) -> IResult<&str, SipUri> {
    map(
        tuple((scheme, opt(userinfo), host, opt(port))),
        |(scheme, user, host, port)| SipUri {
            scheme: scheme.to_ascii_lowercase(),
            user: user.map(str::to_string),
            host: host.to_string(),
            port,
            params: Vec::new(),
            headers: None,
        },
    )(input)
}

pub fn sip_uri(input: &str) -> IResult<&str, SipUri> {
    map(
        tuple((uri_address, many0(preceded(char(';'), uri_param)), opt(uri_headers))),
        |(mut uri, params, headers)| {
            uri.params = params;
            uri.headers = headers.map(str::to_string);
            uri
        },
    )(input)
}
