//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2

use super::{ParseError, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string, escapes already resolved
    String(Vec<u8>),

    /// Hexadecimal string, already converted to bytes
    HexString(Vec<u8>),

    /// Name object (e.g., /Type), `#XX` escapes already resolved
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// R keyword (reference operator)
    R,

    /// Xref keyword
    XRef,

    /// Trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// Null object
    Null,

    /// End of input
    Eof,
}

pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(ch: u8) -> bool {
    !is_whitespace(ch) && !is_delimiter(ch)
}

pub(crate) fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// Tokenizer over an immutable byte buffer.
///
/// The lexer never copies the input; positions are absolute offsets into the
/// buffer it was created with, so error positions map straight back to the file.
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a lexer positioned at `position`
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position: position.min(data.len()),
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to an absolute byte offset
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    /// The whole buffer this lexer reads from
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn next_byte(&mut self) -> Option<u8> {
        let ch = self.peek_byte()?;
        self.position += 1;
        Some(ch)
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) {
                self.position += 1;
            } else if ch == b'%' {
                while let Some(c) = self.next_byte() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Look at the next token without consuming it
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let saved = self.position;
        let token = self.next_token();
        self.position = saved;
        token
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let start = self.position;
        let ch = match self.peek_byte() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'/' => {
                self.position += 1;
                self.read_name(start)
            }
            b'(' => {
                self.position += 1;
                self.read_literal_string(start)
            }
            b'<' => {
                self.position += 1;
                if self.peek_byte() == Some(b'<') {
                    self.position += 1;
                    Ok(Token::DictStart)
                } else {
                    self.read_hex_string(start)
                }
            }
            b'>' => {
                self.position += 1;
                if self.peek_byte() == Some(b'>') {
                    self.position += 1;
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::syntax(start, "Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.position += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.position += 1;
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(start),
            _ if is_regular(ch) => self.read_keyword(start),
            _ => Err(ParseError::syntax(
                start,
                format!("Unexpected character: {}", ch as char),
            )),
        }
    }

    fn read_name(&mut self, start: usize) -> ParseResult<Token> {
        let mut name = String::new();

        while let Some(ch) = self.peek_byte() {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;

            if ch == b'#' {
                let hi = self.next_byte();
                let lo = self.next_byte();
                match (hi, lo) {
                    (Some(hi), Some(lo)) => match (hex_value(hi), hex_value(lo)) {
                        (Some(hi), Some(lo)) => name.push(char::from((hi << 4) | lo)),
                        _ => {
                            return Err(ParseError::syntax(
                                self.position - 2,
                                "Invalid hex escape in name",
                            ))
                        }
                    },
                    _ => {
                        return Err(ParseError::syntax(start, "Unterminated name escape"));
                    }
                }
            } else {
                name.push(char::from(ch));
            }
        }

        Ok(Token::Name(name))
    }

    fn read_literal_string(&mut self, start: usize) -> ParseResult<Token> {
        let mut result = Vec::new();
        let mut depth = 1;

        loop {
            let ch = match self.next_byte() {
                Some(ch) => ch,
                None => return Err(ParseError::syntax(start, "Unterminated string")),
            };

            match ch {
                b'\\' => {
                    let escaped = match self.next_byte() {
                        Some(ch) => ch,
                        None => return Err(ParseError::syntax(start, "Unterminated string")),
                    };

                    match escaped {
                        b'n' => result.push(b'\n'),
                        b'r' => result.push(b'\r'),
                        b't' => result.push(b'\t'),
                        b'b' => result.push(b'\x08'),
                        b'f' => result.push(b'\x0C'),
                        b'(' | b')' | b'\\' => result.push(escaped),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek_byte() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.position += 1;
                                    }
                                    _ => break,
                                }
                            }
                            result.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.peek_byte() == Some(b'\n') {
                                self.position += 1;
                            }
                        }
                        b'\n' => {}
                        other => result.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    result.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(ch);
                }
                // Bare end-of-line markers read as a single LF
                b'\r' => {
                    if self.peek_byte() == Some(b'\n') {
                        self.position += 1;
                    }
                    result.push(b'\n');
                }
                _ => result.push(ch),
            }
        }

        Ok(Token::String(result))
    }

    fn read_hex_string(&mut self, start: usize) -> ParseResult<Token> {
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let ch = match self.next_byte() {
                Some(ch) => ch,
                None => return Err(ParseError::syntax(start, "Unterminated hex string")),
            };

            if ch == b'>' {
                break;
            }
            if is_whitespace(ch) {
                continue;
            }

            let nibble = hex_value(ch).ok_or_else(|| {
                ParseError::syntax(
                    self.position - 1,
                    format!("Invalid hex digit: {}", ch as char),
                )
            })?;

            match pending.take() {
                Some(hi) => result.push((hi << 4) | nibble),
                None => pending = Some(nibble),
            }
        }

        // Odd digit count: the final nibble is padded with zero
        if let Some(hi) = pending {
            result.push(hi << 4);
        }

        Ok(Token::HexString(result))
    }

    fn read_number(&mut self, start: usize) -> ParseResult<Token> {
        while let Some(ch) = self.peek_byte() {
            if matches!(ch, b'+' | b'-' | b'.' | b'0'..=b'9') {
                self.position += 1;
            } else {
                break;
            }
        }

        let text = &self.data[start..self.position];
        let text = std::str::from_utf8(text)
            .map_err(|_| ParseError::syntax(start, "Invalid number"))?;

        let invalid = || ParseError::syntax(start, format!("Invalid number: {text}"));

        // Signs are only allowed in front
        if text[1..].contains(|c: char| c == '+' || c == '-') {
            return Err(invalid());
        }

        if text.contains('.') {
            text.parse::<f64>().map(Token::Real).map_err(|_| invalid())
        } else {
            if !text.bytes().any(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // Out of range integers degrade to reals
                Err(_) => text.parse::<f64>().map(Token::Real).map_err(|_| invalid()),
            }
        }
    }

    fn read_keyword(&mut self, start: usize) -> ParseResult<Token> {
        while let Some(ch) = self.peek_byte() {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;
        }

        let token = match &self.data[start..self.position] {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            b"obj" => Token::Obj,
            b"endobj" => Token::EndObj,
            b"stream" => Token::Stream,
            b"endstream" => Token::EndStream,
            b"R" => Token::R,
            b"xref" => Token::XRef,
            b"trailer" => Token::Trailer,
            b"startxref" => Token::StartXRef,
            other => {
                return Err(ParseError::syntax(
                    start,
                    format!("Unknown keyword: {}", String::from_utf8_lossy(other)),
                ))
            }
        };

        Ok(token)
    }

    /// Consume the end-of-line marker that follows the `stream` keyword
    pub fn read_newline(&mut self) -> ParseResult<()> {
        match self.peek_byte() {
            Some(b'\r') => {
                self.position += 1;
                if self.peek_byte() == Some(b'\n') {
                    self.position += 1;
                }
                Ok(())
            }
            Some(b'\n') => {
                self.position += 1;
                Ok(())
            }
            _ => Err(ParseError::syntax(
                self.position,
                "Expected end of line after 'stream'",
            )),
        }
    }

    /// Read exactly `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                ParseError::syntax(
                    self.position,
                    format!("Requested {n} bytes past end of input"),
                )
            })?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Find the next occurrence of `keyword` at or after the current position
    pub fn find_keyword(&self, keyword: &[u8]) -> Option<usize> {
        if keyword.is_empty() {
            return None;
        }
        self.data[self.position..]
            .windows(keyword.len())
            .position(|w| w == keyword)
            .map(|offset| self.position + offset)
    }

    /// Consume the next token and require it to equal `expected`
    pub fn expect_token(&mut self, expected: Token) -> ParseResult<()> {
        self.skip_whitespace();
        let position = self.position;
        let token = self.next_token()?;
        if token == expected {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                position,
                expected: format!("{expected:?}"),
                found: format!("{token:?}"),
            })
        }
    }
}
