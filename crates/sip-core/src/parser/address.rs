//! From, To and Contact values: name-addr or addr-spec plus header parameters

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, space0},
    combinator::{map, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::parser::uri::{sip_uri, uri_address, Param};
use crate::parser::whitespace::is_token;
use crate::types::uri::SipUri;

/// Display name, URI and header parameters of one address
pub type Address = (Option<String>, SipUri, Vec<Param>);

fn quoted_string(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_till(|c: char| c == '"'), char('"'))(input)
}

fn display_name(input: &str) -> IResult<&str, Option<String>> {
    map(
        alt((quoted_string, take_till(|c: char| c == '<' || c == '"'))),
        |name: &str| {
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        },
    )(input)
}

// name-addr = [ display-name ] LAQUOT addr-spec RAQUOT
fn name_addr(input: &str) -> IResult<&str, (Option<String>, SipUri)> {
    pair(
        terminated(display_name, space0),
        delimited(char('<'), sip_uri, char('>')),
    )(input)
}

fn addr_spec(input: &str) -> IResult<&str, (Option<String>, SipUri)> {
    map(uri_address, |uri| (None, uri))(input)
}

fn is_gen_value_char(c: char) -> bool {
    !matches!(c, ';' | ',' | '"' | '=' | '<' | '>') && !c.is_whitespace()
}

// generic-param = token [ EQUAL gen-value ]
fn header_param(input: &str) -> IResult<&str, Param> {
    map(
        preceded(
            tuple((space0, char(';'), space0)),
            pair(
                take_while1(is_token),
                opt(preceded(
                    tuple((space0, char('='), space0)),
                    alt((recognize(quoted_string), take_while1(is_gen_value_char))),
                )),
            ),
        ),
        |(name, value): (&str, Option<&str>)| (name.to_string(), value.map(str::to_string)),
    )(input)
}

pub fn address(input: &str) -> IResult<&str, Address> {
    map(
        tuple((alt((name_addr, addr_spec)), many0(header_param), space0)),
        |((display_name, uri), params, _)| (display_name, uri, params),
    )(input)
}
