use std::str::{self, FromStr};

use nom::{
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map_res},
    multi::many0,
    sequence::{delimited, separated_pair, terminated, tuple},
    IResult,
};

use crate::parser::whitespace::{crlf, is_line_end, is_token, is_token_char};
use crate::parser::ParseResult;
use crate::types::method::Method;

fn field_text(input: &[u8]) -> ParseResult<&str> {
    map_res(take_till(is_line_end), str::from_utf8)(input)
}

/// message-header = field-name HCOLON field-value CRLF
///
/// Continuation lines that start with whitespace are folded into the value
/// with a single space.
pub fn header_line(input: &[u8]) -> ParseResult<(&str, String)> {
    let (input, name) = map_res(take_while1(is_token_char), str::from_utf8)(input)?;
    let (input, _) = tuple((space0, char(':'), space0))(input)?;
    let (input, first) = terminated(field_text, crlf)(input)?;
    let (input, folded) = many0(delimited(space1, field_text, crlf))(input)?;

    let mut value = first.trim_end().to_string();
    for line in folded {
        value.push(' ');
        value.push_str(line.trim());
    }
    Ok((input, (name, value)))
}

/// CSeq = 1*DIGIT LWS Method
pub fn cseq(input: &str) -> IResult<&str, (u32, Method)> {
    all_consuming(separated_pair(
        map_res(digit1, |seq: &str| seq.parse::<u32>()),
        space1,
        map_res(take_while1(is_token), Method::from_str),
    ))(input)
}

/// Content-Length = 1*DIGIT
///
/// Values that do not fit a `usize` fail to parse.
pub fn content_length(input: &str) -> IResult<&str, usize> {
    all_consuming(map_res(digit1, |len: &str| len.parse::<usize>()))(input)
}
