use super::model::Constant;
use crate::common::{self, is_blank, is_ident_char};
use crate::isa::types::word::Int;
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ExpectedName,
    ExpectedInteger,
    IntegerOverflow(String),
    ExpectedLiteral(String),
    MalformedNumber(String),
    UnterminatedString,
    UnknownEscape(char),
    TrailingCharacters(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ExpectedName => write!(f, "expected a name"),
            Error::ExpectedInteger => write!(f, "expected an integer"),
            Error::IntegerOverflow(raw) => write!(f, "integer '{}' is too large", raw),
            Error::ExpectedLiteral(raw) => write!(f, "expected a constant literal, found '{}'", raw),
            Error::MalformedNumber(raw) => write!(f, "malformed number '{}'", raw),
            Error::UnterminatedString => write!(f, "unterminated string literal"),
            Error::UnknownEscape(c) => write!(f, "unknown escape sequence '\\{}'", c),
            Error::TrailingCharacters(rest) => write!(f, "unexpected trailing '{}'", rest),
        }
    }
}

pub const COMMENT_CHAR: char = ';';

/// A position inside one source line. Every `expect_*`/`*_token` method skips leading blanks
/// and leaves the cursor untouched on failure.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(line: &'a str) -> Self {
        Cursor { line, pos: 0 }
    }

    pub fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn skip_blank(&mut self) {
        while self.peek().map_or(false, is_blank) {
            self.bump();
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().map_or(false, &f) {
            self.bump();
        }
        &self.line[start..self.pos]
    }

    /// True if only blanks, and possibly a comment, remain.
    pub fn at_end(&self) -> bool {
        let mut ahead = *self;
        ahead.skip_blank();
        matches!(ahead.peek(), None | Some(COMMENT_CHAR))
    }

    /// True if the next character ends a token.
    fn at_delimiter(&self) -> bool {
        matches!(self.peek(), None | Some(COMMENT_CHAR)) || self.peek().map_or(false, is_blank)
    }

    /// Consumes the remainder of the line, which must be blank or a comment. Returns the
    /// comment text (including its leading `;`), if any.
    pub fn expect_end(&mut self) -> Result<Option<&'a str>, Error> {
        self.skip_blank();
        match self.peek() {
            None => Ok(None),
            Some(COMMENT_CHAR) => {
                let comment = self.rest();
                self.pos = self.line.len();
                Ok(Some(comment))
            }
            Some(_) => Err(Error::TrailingCharacters(self.rest().to_owned())),
        }
    }

    /// A run of `[A-Za-z0-9_]`.
    pub fn name(&mut self) -> Result<&'a str, Error> {
        let mut ahead = *self;
        ahead.skip_blank();
        let name = ahead.take_while(is_ident_char);
        if name.is_empty() {
            return Err(Error::ExpectedName);
        }
        *self = ahead;
        Ok(name)
    }

    /// A run of ASCII letters, possibly empty. Does not skip blanks.
    pub fn word(&mut self) -> &'a str {
        self.take_while(|c| c.is_ascii_alphabetic())
    }

    /// An optionally signed decimal integer, which must end at a delimiter.
    pub fn integer(&mut self) -> Result<i64, Error> {
        let mut ahead = *self;
        ahead.skip_blank();
        let start = ahead.pos;

        let negative = if ahead.eat('-') {
            true
        } else {
            ahead.eat('+');
            false
        };

        let digits = ahead.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() || !ahead.at_delimiter() {
            return Err(Error::ExpectedInteger);
        }

        let overflow = || Error::IntegerOverflow(ahead.line[start..ahead.pos].to_owned());
        let mut value: i64 = 0;
        for d in digits.bytes() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(d - b'0')))
                .ok_or_else(overflow)?;
        }

        *self = ahead;
        Ok(if negative { -value } else { value })
    }

    /// An integer which must lie in `0..=max`.
    pub fn unsigned(&mut self, max: i64) -> Result<i64, Error> {
        let mut ahead = *self;
        let value = ahead.integer()?;
        if value < 0 || value > max {
            return Err(Error::IntegerOverflow(value.to_string()));
        }
        *self = ahead;
        Ok(value)
    }

    /// A string, number, or `true`/`false`/`nil` literal.
    pub fn literal(&mut self) -> Result<Constant, Error> {
        let mut ahead = *self;
        ahead.skip_blank();

        let constant = match ahead.peek() {
            Some(quote @ '"') | Some(quote @ '\'') => {
                ahead.bump();
                ahead.string_body(quote)?
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                ahead.number()?
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let word = ahead.word();
                if common::eq_ignore_case(word, "true") {
                    Constant::Bool(true)
                } else if common::eq_ignore_case(word, "false") {
                    Constant::Bool(false)
                } else if common::eq_ignore_case(word, "nil") {
                    Constant::Nil
                } else {
                    return Err(Error::ExpectedLiteral(word.to_owned()));
                }
            }
            _ => return Err(Error::ExpectedLiteral(ahead.rest().to_owned())),
        };

        if !ahead.at_delimiter() {
            return Err(Error::TrailingCharacters(ahead.rest().to_owned()));
        }

        *self = ahead;
        Ok(constant)
    }

    fn string_body(&mut self, quote: char) -> Result<Constant, Error> {
        let mut bytes = Vec::new();
        loop {
            let c = self.bump().ok_or(Error::UnterminatedString)?;
            if c == quote {
                return Ok(Constant::String(bytes));
            }

            if c != '\\' {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                continue;
            }

            let escaped = match self.bump().ok_or(Error::UnterminatedString)? {
                'a' => b'\x07',
                'b' => b'\x08',
                'f' => b'\x0c',
                'n' => b'\n',
                'r' => b'\r',
                't' => b'\t',
                'v' => b'\x0b',
                '\\' => b'\\',
                '"' => b'"',
                '\'' => b'\'',
                '[' => b'[',
                ']' => b']',
                other => return Err(Error::UnknownEscape(other)),
            };
            bytes.push(escaped);
        }
    }

    fn malformed_since(&self, start: usize) -> Error {
        Error::MalformedNumber(self.line[start..self.pos].to_owned())
    }

    fn number(&mut self) -> Result<Constant, Error> {
        let start = self.pos;

        let negative = if self.eat('-') {
            true
        } else {
            self.eat('+');
            false
        };

        let rest = self.rest();
        let value = if rest.starts_with("0x") || rest.starts_with("0X") {
            self.pos += 2;
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(self.malformed_since(start));
            }
            digits
                .chars()
                .filter_map(|c| c.to_digit(16))
                .fold(0f64, |acc, d| acc * 16.0 + f64::from(d))
        } else {
            let int_part = self.take_while(|c| c.is_ascii_digit());
            let frac_part = if self.eat('.') {
                self.take_while(|c| c.is_ascii_digit())
            } else {
                ""
            };
            if int_part.is_empty() && frac_part.is_empty() {
                return Err(self.malformed_since(start));
            }
            format!("0{}.{}0", int_part, frac_part)
                .parse::<f64>()
                .map_err(|_| self.malformed_since(start))?
        };

        Ok(Constant::Number(if negative { -value } else { value }))
    }
}

/// Parses the `;L<digits>;` source-line marker at the start of an instruction's comment.
/// A well-formed marker whose number does not fit a line-info entry is an error.
pub fn line_marker(comment: &str) -> Result<Option<Int>, Error> {
    let body = match comment.strip_prefix(";L") {
        Some(body) => body,
        None => return Ok(None),
    };
    let digits_len = match body.find(|c: char| !c.is_ascii_digit()) {
        Some(len) if len > 0 && body[len..].starts_with(COMMENT_CHAR) => len,
        _ => return Ok(None),
    };
    let digits = &body[..digits_len];
    digits
        .parse()
        .map(Some)
        .map_err(|_| Error::IntegerOverflow(digits.to_owned()))
}
