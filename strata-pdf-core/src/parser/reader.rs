//! Low-level PDF Reader
//!
//! Owns the file bytes together with the header and the merged
//! cross-reference table, and parses indirect objects at byte offsets.

use super::header::{PdfHeader, PdfVersion};
use super::lexer::Lexer;
use super::objects::{parse_indirect_object, PdfDictionary, PdfObject};
use super::xref::XRefTable;
use super::{ParseError, ParseOptions, ParseResult};
use std::path::Path;

/// Low-level PDF reader
#[derive(Debug)]
pub struct PdfReader {
    data: Vec<u8>,
    header: PdfHeader,
    xref: XRefTable,
    /// Parsing options
    options: ParseOptions,
}

impl PdfReader {
    /// Open a PDF file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    /// Open a PDF file with strict parsing
    pub fn open_strict<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ParseOptions::strict())
    }

    /// Open a PDF file with custom parsing options
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> ParseResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes_with_options(data, options)
    }

    /// Read a PDF held in memory
    pub fn from_bytes(data: Vec<u8>) -> ParseResult<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    /// Read a PDF held in memory with custom parsing options.
    ///
    /// Fails on a bad header, an unreadable cross-reference chain or an
    /// encrypted document.
    pub fn from_bytes_with_options(data: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        let header = PdfHeader::parse(&data, options.strict)?;
        let (data, xref) = Self::load_xref(data, &header, &options)?;

        if xref.trailer().contains_key("Encrypt") {
            return Err(ParseError::EncryptionNotSupported);
        }

        tracing::debug!(
            version = %header.version,
            bytes = data.len(),
            objects = xref.len(),
            "Opened PDF"
        );

        Ok(Self {
            data,
            header,
            xref,
            options,
        })
    }

    /// Load the cross-reference chain.
    ///
    /// When bytes precede `%PDF-` and the recorded offsets don't fit the file
    /// as it is, they are read as relative to the header and the leading bytes
    /// are dropped.
    fn load_xref(
        mut data: Vec<u8>,
        header: &PdfHeader,
        options: &ParseOptions,
    ) -> ParseResult<(Vec<u8>, XRefTable)> {
        match XRefTable::load(&data, options) {
            Ok(xref) => Ok((data, xref)),
            Err(err) if header.offset > 0 => {
                let xref = XRefTable::load(&data[header.offset..], options).map_err(|_| err)?;
                tracing::warn!(
                    offset = header.offset,
                    "Offsets are relative to the header; dropping the bytes before it"
                );
                data.drain(..header.offset);
                Ok((data, xref))
            }
            Err(err) => Err(err),
        }
    }

    /// Get parsing options
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn header(&self) -> &PdfHeader {
        &self.header
    }

    /// Get the PDF version
    pub fn version(&self) -> PdfVersion {
        self.header.version
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// The trailer merged across all cross-reference sections
    pub fn trailer(&self) -> &PdfDictionary {
        self.xref.trailer()
    }

    /// The file bytes, starting at the header when offsets were rebased
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Parse the indirect object `obj_num gen_num obj` stored at `offset`.
    ///
    /// `resolve_length` supplies the value of an indirect stream `/Length`.
    pub fn parse_object_at(
        &self,
        offset: u64,
        obj_num: u32,
        gen_num: u16,
        resolve_length: &dyn Fn(u32, u16) -> ParseResult<i64>,
    ) -> ParseResult<PdfObject> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&o| o < self.data.len())
            .ok_or_else(|| {
                ParseError::syntax(
                    self.data.len(),
                    format!("object {obj_num} offset {offset} is beyond the end of the file"),
                )
            })?;

        let mut lexer = Lexer::at(&self.data, start);
        let indirect = parse_indirect_object(&mut lexer, &self.options, resolve_length)?;

        if indirect.obj_num != obj_num {
            return Err(ParseError::syntax(
                start,
                format!(
                    "expected object {obj_num}, found object {} {}",
                    indirect.obj_num, indirect.gen_num
                ),
            ));
        }
        if indirect.gen_num != gen_num {
            tracing::warn!(
                obj_num,
                expected = gen_num,
                found = indirect.gen_num,
                "Generation number differs from the cross-reference entry"
            );
        }

        Ok(indirect.object)
    }
}
