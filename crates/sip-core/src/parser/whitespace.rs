use nom::{branch::alt, bytes::complete::tag};

use crate::parser::ParseResult;

/// Parses CRLF (accepts \r\n or just \n)
pub fn crlf(input: &[u8]) -> ParseResult<&[u8]> {
    alt((tag("\r\n"), tag("\n")))(input)
}

pub fn is_line_end(c: u8) -> bool {
    c == b'\r' || c == b'\n'
}

// token = 1*(alphanum / "-" / "." / "!" / "%" / "*" / "_" / "+" / "`" / "'" / "~")
pub fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'-' | b'.' | b'!' | b'%' | b'*' | b'_' | b'+' | b'`' | b'\'' | b'~')
}

pub fn is_token(c: char) -> bool {
    c.is_ascii() && is_token_char(c as u8)
}
