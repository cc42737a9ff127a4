//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+)

use super::lexer::{Lexer, Token};
use super::objects::{PdfObject, PdfStream};
use super::{ParseError, ParseOptions, ParseResult};

/// A decoded object stream: the `N` (object number, offset) header pairs plus
/// the decoded payload the offsets point into.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Object number of the stream itself
    obj_num: u32,
    /// Offset of the first object within `data`
    first: usize,
    /// Header pairs, in stream order
    offsets: Vec<(u32, usize)>,
    /// Decoded stream data
    data: Vec<u8>,
}

impl ObjectStream {
    /// Decode an object stream and read its header
    pub fn parse(obj_num: u32, stream: &PdfStream) -> ParseResult<Self> {
        let dict = &stream.dict;
        let invalid = |message: String| ParseError::InvalidObjectStream(obj_num, message);

        match dict.get_type() {
            Some("ObjStm") => {}
            other => tracing::warn!(obj_num, found = ?other, "Object stream does not declare /Type /ObjStm"),
        }

        let n = dict
            .get("N")
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?
            .as_integer()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid("/N must be a non-negative integer".to_string()))?;

        let first = dict
            .get("First")
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?
            .as_integer()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid("/First must be a non-negative integer".to_string()))?;

        let data = stream.decode()?;
        if first > data.len() {
            return Err(invalid(format!(
                "/First {first} is beyond the decoded length {}",
                data.len()
            )));
        }

        // The header is bounded by /First, so /N cannot run past it
        let mut lexer = Lexer::new(&data[..first]);
        let mut offsets = Vec::with_capacity(n.min(first / 2));
        for i in 0..n {
            let number = read_header_integer(&mut lexer).map_err(|_| {
                invalid(format!("header pair {i} has no object number"))
            })?;
            let offset = read_header_integer(&mut lexer)
                .map_err(|_| invalid(format!("header pair {i} has no offset")))?;

            let number = u32::try_from(number)
                .map_err(|_| invalid(format!("invalid object number {number}")))?;
            let offset = usize::try_from(offset)
                .map_err(|_| invalid(format!("invalid offset {offset}")))?;
            offsets.push((number, offset));
        }

        tracing::trace!(obj_num, objects = n, first, "Decoded object stream");

        Ok(Self {
            obj_num,
            first,
            offsets,
            data,
        })
    }

    /// Object number of the stream itself
    pub fn obj_num(&self) -> u32 {
        self.obj_num
    }

    /// Number of objects in the stream
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Object numbers in stream order
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.iter().map(|&(number, _)| number)
    }

    /// Parse the object at `index`, returning its object number as well.
    ///
    /// Objects in a stream have no `obj`/`endobj` envelope and cannot be streams.
    pub fn get_object(&self, index: usize, options: &ParseOptions) -> ParseResult<(u32, PdfObject)> {
        let &(number, offset) = self.offsets.get(index).ok_or_else(|| {
            ParseError::InvalidObjectStream(
                self.obj_num,
                format!("index {index} out of range ({} objects)", self.offsets.len()),
            )
        })?;

        let start = self
            .first
            .checked_add(offset)
            .filter(|&start| start < self.data.len())
            .ok_or_else(|| {
                ParseError::InvalidObjectStream(
                    self.obj_num,
                    format!("object {number} offset {offset} is beyond the stream data"),
                )
            })?;

        let mut lexer = Lexer::at(&self.data, start);
        let object = PdfObject::parse_with_options(&mut lexer, options)?;
        Ok((number, object))
    }

    /// Locate an object by number, for entries whose index is stale
    pub fn find(&self, obj_num: u32) -> Option<usize> {
        self.offsets.iter().position(|&(number, _)| number == obj_num)
    }
}

fn read_header_integer(lexer: &mut Lexer<'_>) -> ParseResult<i64> {
    match lexer.next_token()? {
        Token::Integer(n) => Ok(n),
        other => Err(ParseError::syntax(
            lexer.position(),
            format!("expected integer in object stream header, found {other:?}"),
        )),
    }
}
