//! Grammar of `WWW-Authenticate` and `Authorization` values
//!
//! ```text
//! challenge  = auth-scheme LWS auth-param *(COMMA auth-param)
//! auth-param = token EQUAL ( token / quoted-string )
//! ```

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::recognize,
    multi::{many1, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

fn is_token(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '!' | '%' | '*' | '_' | '+' | '`' | '\'' | '~')
}

pub fn auth_scheme(input: &str) -> IResult<&str, &str> {
    take_while1(is_token)(input)
}

fn quoted_string(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_till(|c: char| c == '"'), char('"'))(input)
}

// One or more commas; empty list elements are skipped
fn comma(input: &str) -> IResult<&str, &str> {
    recognize(pair(multispace0, many1(terminated(char(','), multispace0))))(input)
}

pub fn auth_param(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(is_token),
        tuple((multispace0, char('='), multispace0)),
        alt((quoted_string, take_while1(is_token))),
    )(input)
}

pub fn auth_params(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    separated_list0(comma, auth_param)(input)
}

/// The list element `auth_params` stopped at, empty when only separators remain
pub fn next_segment(input: &str) -> IResult<&str, &str> {
    preceded(
        take_while(|c: char| c == ',' || c.is_whitespace()),
        take_till(|c: char| c == ','),
    )(input)
}
