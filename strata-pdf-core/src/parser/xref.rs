//! PDF Cross-Reference Table Parser
//!
//! Parses xref tables according to ISO 32000-1 Section 7.5.4 and
//! cross-reference streams (Section 7.5.8), following `/Prev` through every
//! incremental update and merging the sections into one table.

use super::lexer::{is_whitespace, Lexer, Token};
use super::objects::{parse_indirect_object, PdfDictionary, PdfObject};
use super::xref_stream::XRefStream;
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::{HashMap, HashSet};

/// How far back from the end of the file `startxref` is searched for
const STARTXREF_SEARCH_WINDOW: usize = 1024;

/// Keys that describe a cross-reference stream itself rather than the document
const XREF_STREAM_KEYS: [&str; 7] = ["Type", "W", "Index", "Length", "Filter", "DecodeParms", "DP"];

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object entry
    Free {
        /// Next free object number
        next_free: u32,
        /// Generation number
        generation: u16,
    },
    /// In-use object stored at a byte offset
    InUse {
        /// Byte offset in the file
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object packed inside an object stream (PDF 1.5+)
    Compressed {
        /// Object number of the object stream containing this object
        stream_obj_num: u32,
        /// Index of this object within the object stream
        index: u32,
    },
}

impl XRefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }
}

/// The encoding a cross-reference section was stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefSectionKind {
    Table,
    Stream,
}

/// One section before merging
#[derive(Debug, Clone)]
struct XRefSection {
    kind: XRefSectionKind,
    entries: Vec<(u32, XRefEntry)>,
    trailer: PdfDictionary,
}

/// Cross-reference table merged across every incremental update
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    /// Map of object number to xref entry
    entries: HashMap<u32, XRefEntry>,
    /// Trailer keys, most recent section first
    trailer: PdfDictionary,
    /// Offset recorded after the last `startxref`
    startxref: u64,
    /// Encodings of the sections walked, newest first
    sections: Vec<XRefSectionKind>,
}

impl XRefTable {
    /// Create a new empty xref table
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate `startxref` and walk every section reachable through `/Prev`.
    ///
    /// The walk is iterative; an offset seen twice is a [`ParseError::CircularXRef`]
    /// and more than `options.max_xref_sections` sections is an error too.
    pub fn load(data: &[u8], options: &ParseOptions) -> ParseResult<Self> {
        let startxref = find_startxref(data)?;
        let mut table = XRefTable {
            startxref,
            ..Self::default()
        };

        let mut visited = HashSet::new();
        let mut next = Some(startxref);

        while let Some(offset) = next {
            table.visit(offset, &mut visited, options)?;

            let section = table.parse_section(data, offset, options)?;
            let prev = offset_key(&section.trailer, "Prev")?;
            let xref_stm = match section.kind {
                XRefSectionKind::Table => offset_key(&section.trailer, "XRefStm")?,
                XRefSectionKind::Stream => None,
            };

            tracing::debug!(
                offset,
                kind = ?section.kind,
                entries = section.entries.len(),
                "Read cross-reference section"
            );

            table.sections.push(section.kind);
            table.merge_entries(section.entries);

            // Hybrid files: the stream's entries rank after the table's own, before /Prev
            if let Some(stm_offset) = xref_stm {
                table.visit(stm_offset, &mut visited, options)?;
                match table.parse_stream_section(data, stm_offset, options) {
                    Ok(stream_section) => table.merge_entries(stream_section.entries),
                    Err(err) if !options.strict => {
                        tracing::warn!(offset = stm_offset, error = %err, "Ignoring unreadable /XRefStm");
                    }
                    Err(err) => return Err(err),
                }
            }

            table.merge_trailer(section.trailer);
            next = prev;
        }

        tracing::debug!(
            sections = table.sections.len(),
            objects = table.entries.len(),
            "Cross-reference table loaded"
        );

        Ok(table)
    }

    fn visit(
        &self,
        offset: u64,
        visited: &mut HashSet<u64>,
        options: &ParseOptions,
    ) -> ParseResult<()> {
        if !visited.insert(offset) {
            return Err(ParseError::CircularXRef(offset));
        }
        if visited.len() > options.max_xref_sections {
            return Err(ParseError::InvalidXRef(format!(
                "more than {} cross-reference sections",
                options.max_xref_sections
            )));
        }
        Ok(())
    }

    /// Auto-detect the section encoding by peeking for the `xref` keyword
    fn parse_section(
        &self,
        data: &[u8],
        offset: u64,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection> {
        let start = checked_offset(data, offset)?;
        let mut lexer = Lexer::at(data, start);

        if matches!(lexer.peek_token(), Ok(Token::XRef)) {
            parse_table_section(&mut lexer, options)
        } else {
            self.parse_stream_section(data, offset, options)
        }
    }

    fn parse_stream_section(
        &self,
        data: &[u8],
        offset: u64,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection> {
        let start = checked_offset(data, offset)?;
        let mut lexer = Lexer::at(data, start);

        let resolve_length =
            |obj_num: u32, _gen: u16| self.resolve_length(data, obj_num, options);
        let indirect = parse_indirect_object(&mut lexer, options, &resolve_length)?;

        let stream = match indirect.object {
            PdfObject::Stream(stream) => stream,
            other => {
                return Err(ParseError::InvalidXRef(format!(
                    "expected a cross-reference stream at offset {offset}, found {}",
                    other.type_name()
                )))
            }
        };

        let entries = XRefStream::parse(&stream)?.entries(options.strict)?;

        let mut trailer = stream.dict;
        for key in XREF_STREAM_KEYS {
            trailer.remove(key);
        }

        Ok(XRefSection {
            kind: XRefSectionKind::Stream,
            entries,
            trailer,
        })
    }

    /// Resolve an indirect `/Length` of a cross-reference stream from the
    /// sections merged so far.
    fn resolve_length(&self, data: &[u8], obj_num: u32, options: &ParseOptions) -> ParseResult<i64> {
        let offset = match self.entries.get(&obj_num) {
            Some(XRefEntry::InUse { offset, .. }) => checked_offset(data, *offset)?,
            _ => return Err(ParseError::InvalidReference(obj_num, 0)),
        };

        let mut lexer = Lexer::at(data, offset);
        let no_nested = |n: u32, g: u16| -> ParseResult<i64> { Err(ParseError::InvalidReference(n, g)) };
        parse_indirect_object(&mut lexer, options, &no_nested)?
            .object
            .as_integer()
            .ok_or_else(|| ParseError::InvalidXRef(format!("/Length object {obj_num} is not an integer")))
    }

    /// Newer sections are merged first, so an existing entry always wins
    fn merge_entries(&mut self, entries: Vec<(u32, XRefEntry)>) {
        for (obj_num, entry) in entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
    }

    fn merge_trailer(&mut self, trailer: PdfDictionary) {
        for (key, value) in trailer.0 {
            self.trailer.0.entry(key).or_insert(value);
        }
    }

    /// Get an xref entry by object number
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Insert an entry unless the object number is already mapped
    pub fn add_entry(&mut self, obj_num: u32, entry: XRefEntry) {
        self.entries.entry(obj_num).or_insert(entry);
    }

    /// The merged trailer dictionary
    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// Encodings of the sections that were merged, newest first
    pub fn sections(&self) -> &[XRefSectionKind] {
        &self.sections
    }

    /// Declared `/Size` of the trailer, if any
    pub fn size(&self) -> Option<u32> {
        self.trailer
            .get("Size")
            .and_then(|obj| obj.as_integer())
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }
}

fn checked_offset(data: &[u8], offset: u64) -> ParseResult<usize> {
    usize::try_from(offset)
        .ok()
        .filter(|&o| o < data.len())
        .ok_or_else(|| {
            ParseError::InvalidXRef(format!(
                "offset {offset} is beyond the end of the file ({} bytes)",
                data.len()
            ))
        })
}

/// Read an optional byte-offset entry such as `/Prev` from a trailer
fn offset_key(trailer: &PdfDictionary, key: &str) -> ParseResult<Option<u64>> {
    match trailer.get(key) {
        None => Ok(None),
        Some(PdfObject::Integer(n)) if *n >= 0 => Ok(Some(*n as u64)),
        Some(other) => Err(ParseError::InvalidTrailer(format!(
            "/{key} must be a non-negative integer, found {other}"
        ))),
    }
}

/// Find the offset recorded after the last `startxref` keyword
pub fn find_startxref(data: &[u8]) -> ParseResult<u64> {
    let window_start = data.len().saturating_sub(STARTXREF_SEARCH_WINDOW);
    let keyword = b"startxref";

    let position = data[window_start..]
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .map(|p| window_start + p)
        .ok_or_else(|| ParseError::InvalidXRef("startxref not found".to_string()))?;

    let mut lexer = Lexer::at(data, position + keyword.len());
    match lexer.next_token() {
        Ok(Token::Integer(offset)) if offset >= 0 => Ok(offset as u64),
        _ => Err(ParseError::InvalidXRef(
            "startxref is not followed by a byte offset".to_string(),
        )),
    }
}

/// Parse `xref`, its subsections and the trailer dictionary
fn parse_table_section(lexer: &mut Lexer<'_>, options: &ParseOptions) -> ParseResult<XRefSection> {
    lexer.expect_token(Token::XRef)?;
    let mut entries = Vec::new();

    loop {
        lexer.skip_whitespace();
        let position = lexer.position();

        match lexer.next_token()? {
            Token::Trailer => break,
            Token::Integer(first) => {
                let count = match lexer.next_token()? {
                    Token::Integer(count) => count,
                    other => {
                        return Err(ParseError::InvalidXRef(format!(
                            "subsection header at offset {position} has no count, found {other:?}"
                        )))
                    }
                };

                let (first, count) = match (u32::try_from(first), u32::try_from(count)) {
                    (Ok(first), Ok(count)) if first.checked_add(count).is_some() => (first, count),
                    _ => {
                        return Err(ParseError::InvalidXRef(format!(
                            "invalid subsection {first} {count} at offset {position}"
                        )))
                    }
                };

                for i in 0..count {
                    lexer.skip_whitespace();
                    entries.push((first + i, read_table_entry(lexer)?));
                }
            }
            other => {
                return Err(ParseError::InvalidXRef(format!(
                    "expected subsection header or trailer at offset {position}, found {other:?}"
                )))
            }
        }
    }

    let trailer = match PdfObject::parse_with_options(lexer, options)? {
        PdfObject::Dictionary(dict) => dict,
        other => {
            return Err(ParseError::InvalidTrailer(format!(
                "expected a dictionary, found {}",
                other.type_name()
            )))
        }
    };

    Ok(XRefSection {
        kind: XRefSectionKind::Table,
        entries,
        trailer,
    })
}

/// Read one `nnnnnnnnnn ggggg n` record.
///
/// Records are nominally 20 bytes, but the separators and line ending are
/// read loosely since writers disagree on them.
fn read_table_entry(lexer: &mut Lexer<'_>) -> ParseResult<XRefEntry> {
    let data = lexer.data();
    let start = lexer.position();
    let mut pos = start;

    let invalid = |what: &str| ParseError::InvalidXRef(format!("malformed entry at offset {start}: {what}"));

    let offset = read_digits(data, &mut pos, 10).ok_or_else(|| invalid("bad offset"))?;
    skip_spaces(data, &mut pos);
    let generation = read_digits(data, &mut pos, 5)
        .and_then(|g| u16::try_from(g).ok())
        .ok_or_else(|| invalid("bad generation"))?;
    skip_spaces(data, &mut pos);

    let flag = data.get(pos).copied();
    lexer.seek(pos + 1);

    match flag {
        Some(b'n') => Ok(XRefEntry::InUse { offset, generation }),
        Some(b'f') => Ok(XRefEntry::Free {
            next_free: u32::try_from(offset).map_err(|_| invalid("bad free-list link"))?,
            generation,
        }),
        _ => Err(invalid("flag must be 'n' or 'f'")),
    }
}

fn read_digits(data: &[u8], pos: &mut usize, max_len: usize) -> Option<u64> {
    let start = *pos;
    while *pos < data.len() && *pos - start < max_len && data[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    std::str::from_utf8(&data[start..*pos]).ok()?.parse().ok()
}

fn skip_spaces(data: &[u8], pos: &mut usize) {
    while *pos < data.len() && is_whitespace(data[*pos]) {
        *pos += 1;
    }
}
