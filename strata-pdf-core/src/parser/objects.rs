//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use std::fmt;

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

/// PDF String object
///
/// Keeps the raw bytes together with whether the string was written in
/// hexadecimal form, so it can be written back the way it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString {
    pub bytes: Vec<u8>,
    pub hex: bool,
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<PdfName, PdfObject>);

/// PDF Stream object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    /// Run the raw bytes through the `/Filter` chain
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.data, &self.dict)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    /// Object number, generation number
    Reference(u32, u16),
}

/// An `N G obj ... endobj` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub obj_num: u32,
    pub gen_num: u16,
    pub object: PdfObject,
}

fn unexpected(position: usize, expected: &str, token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        position,
        expected: expected.to_string(),
        found: format!("{token:?}"),
    }
}

impl PdfObject {
    /// Parse a PDF object from a lexer
    pub fn parse(lexer: &mut Lexer<'_>) -> ParseResult<Self> {
        Self::parse_with_options(lexer, &ParseOptions::default())
    }

    /// Parse a PDF object, bounding nesting depth by `options.max_recursion_depth`
    pub fn parse_with_options(lexer: &mut Lexer<'_>, options: &ParseOptions) -> ParseResult<Self> {
        Self::parse_nested(lexer, 0, options.max_recursion_depth)
    }

    fn parse_nested(lexer: &mut Lexer<'_>, depth: usize, max_depth: usize) -> ParseResult<Self> {
        lexer.skip_whitespace();
        let position = lexer.position();
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token, position, depth, max_depth)
    }

    /// Parse a PDF object starting from a specific token
    fn parse_from_token(
        lexer: &mut Lexer<'_>,
        token: Token,
        position: usize,
        depth: usize,
        max_depth: usize,
    ) -> ParseResult<Self> {
        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Integer(i) => Self::parse_integer_or_reference(lexer, i, position),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::String(s) => Ok(PdfObject::String(PdfString::new(s))),
            Token::HexString(s) => Ok(PdfObject::String(PdfString::new_hex(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::ArrayStart | Token::DictStart if depth >= max_depth => {
                Err(ParseError::RecursionLimit(max_depth))
            }
            Token::ArrayStart => Self::parse_array(lexer, depth + 1, max_depth),
            Token::DictStart => Ok(PdfObject::Dictionary(Self::parse_dictionary_inner(
                lexer,
                depth + 1,
                max_depth,
            )?)),
            Token::Eof => Err(ParseError::syntax(position, "Unexpected end of input")),
            _ => Err(unexpected(position, "PDF object", &token)),
        }
    }

    /// `N G R` collapses into a reference; anything else replays the lookahead
    fn parse_integer_or_reference(
        lexer: &mut Lexer<'_>,
        value: i64,
        position: usize,
    ) -> ParseResult<Self> {
        let checkpoint = lexer.position();

        if let Ok(Token::Integer(gen)) = lexer.next_token() {
            if let Ok(Token::R) = lexer.next_token() {
                let obj_num = u32::try_from(value).map_err(|_| {
                    ParseError::syntax(position, format!("Invalid object number {value}"))
                })?;
                let gen_num = u16::try_from(gen).map_err(|_| {
                    ParseError::syntax(position, format!("Invalid generation number {gen}"))
                })?;
                return Ok(PdfObject::Reference(obj_num, gen_num));
            }
        }

        lexer.seek(checkpoint);
        Ok(PdfObject::Integer(value))
    }

    /// Parse a PDF array
    fn parse_array(lexer: &mut Lexer<'_>, depth: usize, max_depth: usize) -> ParseResult<Self> {
        let mut elements = Vec::new();

        loop {
            lexer.skip_whitespace();
            let position = lexer.position();
            let token = lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Eof => return Err(ParseError::syntax(position, "Unterminated array")),
                _ => elements.push(Self::parse_from_token(
                    lexer, token, position, depth, max_depth,
                )?),
            }
        }

        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse dictionary entries up to and including `>>`
    fn parse_dictionary_inner(
        lexer: &mut Lexer<'_>,
        depth: usize,
        max_depth: usize,
    ) -> ParseResult<PdfDictionary> {
        let mut dict = HashMap::new();

        loop {
            lexer.skip_whitespace();
            let position = lexer.position();
            let token = lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = Self::parse_nested(lexer, depth, max_depth)?;
                    dict.insert(PdfName(key), value);
                }
                Token::Eof => return Err(ParseError::syntax(position, "Unterminated dictionary")),
                _ => return Err(unexpected(position, "dictionary key (name) or >>", &token)),
            }
        }

        Ok(PdfDictionary(dict))
    }

    /// Check if this object is null
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as real number; integers convert
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as name
    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as dictionary; a stream yields its dictionary
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Get as reference
    pub fn as_reference(&self) -> Option<(u32, u16)> {
        match self {
            PdfObject::Reference(obj, gen) => Some((*obj, *gen)),
            _ => None,
        }
    }

    /// Short type label used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            PdfObject::Null => "null",
            PdfObject::Boolean(_) => "boolean",
            PdfObject::Integer(_) => "integer",
            PdfObject::Real(_) => "real",
            PdfObject::String(_) => "string",
            PdfObject::Name(_) => "name",
            PdfObject::Array(_) => "array",
            PdfObject::Dictionary(_) => "dictionary",
            PdfObject::Stream(_) => "stream",
            PdfObject::Reference(..) => "reference",
        }
    }
}

impl fmt::Display for PdfObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        crate::writer::write_object_value(&mut out, self).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

/// Parse an `N G obj ... endobj` definition at the lexer's position.
///
/// A dictionary followed by `stream` becomes a [`PdfStream`]. Its `/Length`
/// may be indirect, in which case `resolve_length` is asked for the value.
pub fn parse_indirect_object(
    lexer: &mut Lexer<'_>,
    options: &ParseOptions,
    resolve_length: &dyn Fn(u32, u16) -> ParseResult<i64>,
) -> ParseResult<IndirectObject> {
    lexer.skip_whitespace();
    let start = lexer.position();

    let obj_num = match lexer.next_token()? {
        Token::Integer(n) => u32::try_from(n)
            .map_err(|_| ParseError::syntax(start, format!("Invalid object number {n}")))?,
        other => return Err(unexpected(start, "object number", &other)),
    };

    lexer.skip_whitespace();
    let gen_position = lexer.position();
    let gen_num = match lexer.next_token()? {
        Token::Integer(n) => u16::try_from(n)
            .map_err(|_| ParseError::syntax(gen_position, format!("Invalid generation {n}")))?,
        other => return Err(unexpected(gen_position, "generation number", &other)),
    };

    lexer.expect_token(Token::Obj)?;

    let mut object = PdfObject::parse_with_options(lexer, options)?;

    lexer.skip_whitespace();
    let keyword_position = lexer.position();
    let mut token = lexer.next_token()?;

    if token == Token::Stream {
        let dict = match object {
            PdfObject::Dictionary(dict) => dict,
            other => {
                return Err(ParseError::syntax(
                    keyword_position,
                    format!("Stream body must follow a dictionary, not {}", other.type_name()),
                ))
            }
        };

        let data = read_stream_data(lexer, &dict, options, resolve_length)?;
        object = PdfObject::Stream(PdfStream { dict, data });

        lexer.skip_whitespace();
        token = lexer.next_token()?;
    }

    match token {
        Token::EndObj => Ok(IndirectObject {
            obj_num,
            gen_num,
            object,
        }),
        other => Err(unexpected(keyword_position, "endobj", &other)),
    }
}

/// Read the bytes between `stream` and `endstream`, consuming `endstream`.
fn read_stream_data(
    lexer: &mut Lexer<'_>,
    dict: &PdfDictionary,
    options: &ParseOptions,
    resolve_length: &dyn Fn(u32, u16) -> ParseResult<i64>,
) -> ParseResult<Vec<u8>> {
    lexer.read_newline()?;
    let data_start = lexer.position();

    let exact = declared_length(lexer, dict, resolve_length).and_then(|length| {
        let data = lexer.read_bytes(length)?;
        lexer.expect_token(Token::EndStream)?;
        Ok(data.to_vec())
    });

    match exact {
        Ok(data) => Ok(data),
        Err(err) if options.lenient_streams && !options.strict => {
            lexer.seek(data_start);
            let end = lexer.find_keyword(b"endstream").ok_or(err)?;

            let mut data = &lexer.data()[data_start..end];
            if let Some(stripped) = data.strip_suffix(b"\r\n") {
                data = stripped;
            } else if let Some(stripped) = data
                .strip_suffix(b"\n")
                .or_else(|| data.strip_suffix(b"\r"))
            {
                data = stripped;
            }

            tracing::warn!(
                offset = data_start,
                recovered = data.len(),
                "Stream /Length unusable, recovered data by scanning for endstream"
            );

            lexer.seek(end + b"endstream".len());
            Ok(data.to_vec())
        }
        Err(err) => Err(err),
    }
}

fn declared_length(
    lexer: &Lexer<'_>,
    dict: &PdfDictionary,
    resolve_length: &dyn Fn(u32, u16) -> ParseResult<i64>,
) -> ParseResult<usize> {
    let length = match dict.get("Length") {
        Some(PdfObject::Integer(len)) => *len,
        Some(PdfObject::Reference(obj_num, gen_num)) => resolve_length(*obj_num, *gen_num)?,
        Some(other) => {
            return Err(ParseError::syntax(
                lexer.position(),
                format!("Invalid stream /Length of type {}", other.type_name()),
            ))
        }
        None => return Err(ParseError::MissingKey("Length".to_string())),
    };

    usize::try_from(length).map_err(|_| {
        ParseError::syntax(lexer.position(), format!("Negative stream /Length {length}"))
    })
}

impl PdfDictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        PdfDictionary(HashMap::new())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName(key.to_string()))
    }

    /// Insert a key-value pair
    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName(key.into()), value);
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.remove(&PdfName(key.to_string()))
    }

    /// Check if dictionary contains a key
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&PdfName(key.to_string()))
    }

    /// Get the dictionary type (value of /Type key)
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name()).map(|n| n.0.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the dictionary has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.0.iter()
    }
}

impl PdfArray {
    /// Create a new empty array
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    /// Get array length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if array is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get element at index
    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    /// Push an element
    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }
}

impl PdfString {
    /// A literal string
    pub fn new(bytes: Vec<u8>) -> Self {
        PdfString { bytes, hex: false }
    }

    /// A string that was (or will be) written as `<hex>`
    pub fn new_hex(bytes: Vec<u8>) -> Self {
        PdfString { bytes, hex: true }
    }

    /// Get as UTF-8 string if possible
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the string came from hexadecimal syntax
    pub fn is_hex(&self) -> bool {
        self.hex
    }

    /// Decode a text string: UTF-16BE when BOM-prefixed, otherwise
    /// PDFDocEncoding (approximated by Latin-1).
    pub fn to_text(&self) -> String {
        match self.bytes.strip_prefix(&[0xFE, 0xFF]) {
            Some(utf16) => {
                let units: Vec<u16> = utf16
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            None => self.bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl PdfName {
    /// Create a new PDF name
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    /// Get the name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
