//! PDF Parser Module
//!
//! Reads PDF files according to ISO 32000-1 (PDF 1.7) and ISO 32000-2 (PDF 2.0):
//! tokenizing, object parsing, stream filters, cross-reference resolution and
//! page tree traversal.

pub mod document;
pub mod filter_impls;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod reader;
pub mod xref;
pub mod xref_stream;

pub use self::document::{DocumentMetadata, PdfDocument, ResourceManager};
pub use self::header::{PdfHeader, PdfVersion};
pub use self::lexer::{Lexer, Token};
pub use self::objects::{PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::page_tree::{ParsedPage, Rectangle};
pub use self::reader::PdfReader;
pub use self::xref::{XRefEntry, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Tunables for how strictly a document is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject recoverable anomalies (bad stream lengths, header not at byte 0).
    pub strict: bool,
    /// Scan forward for `endstream` when `/Length` is missing or wrong.
    pub lenient_streams: bool,
    /// Bound on nesting of arrays/dictionaries and on reference chains.
    pub max_recursion_depth: usize,
    /// Bound on the number of cross-reference sections followed through `/Prev`.
    pub max_xref_sections: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            lenient_streams: false,
            max_recursion_depth: 64,
            max_xref_sections: 1024,
        }
    }
}

impl ParseOptions {
    /// Options that fail on any recoverable anomaly.
    pub fn strict() -> Self {
        Self {
            strict: true,
            lenient_streams: false,
            ..Self::default()
        }
    }

    /// Options that recover from damaged stream lengths.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            lenient_streams: true,
            ..Self::default()
        }
    }
}

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty file")]
    EmptyFile,

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table: {0}")]
    InvalidXRef(String),

    #[error("Invalid trailer: {0}")]
    InvalidTrailer(String),

    #[error("Cross-reference section at offset {0} visited twice")]
    CircularXRef(u64),

    #[error("Circular reference detected while resolving object {0}")]
    CircularReference(u32),

    #[error("Recursion limit of {0} exceeded")]
    RecursionLimit(usize),

    #[error("Invalid object stream {0}: {1}")]
    InvalidObjectStream(u32, String),

    #[error("{filter} failed: {message}")]
    Filter { filter: String, message: String },

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Encryption not supported")]
    EncryptionNotSupported,

    #[error("Page {requested} out of range (document has {count} pages)")]
    PageOutOfRange { requested: usize, count: usize },

    #[error("Document is closed")]
    DocumentClosed,
}

impl ParseError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::SyntaxError {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn filter(filter: &str, message: impl Into<String>) -> Self {
        ParseError::Filter {
            filter: filter.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_presets() {
        let default = ParseOptions::default();
        assert!(!default.strict);
        assert!(!default.lenient_streams);
        assert_eq!(default.max_recursion_depth, 64);

        let strict = ParseOptions::strict();
        assert!(strict.strict);
        assert!(!strict.lenient_streams);

        let lenient = ParseOptions::lenient();
        assert!(!lenient.strict);
        assert!(lenient.lenient_streams);
        assert_eq!(lenient.max_xref_sections, 1024);
    }

    #[test]
    fn test_error_display() {
        let err = ParseError::syntax(42, "bad token");
        assert_eq!(err.to_string(), "Syntax error at position 42: bad token");

        let err = ParseError::filter("LZWDecode", "invalid code 4000");
        assert_eq!(err.to_string(), "LZWDecode failed: invalid code 4000");

        let err = ParseError::PageOutOfRange {
            requested: 3,
            count: 1,
        };
        assert_eq!(
            err.to_string(),
            "Page 3 out of range (document has 1 pages)"
        );

        assert_eq!(
            ParseError::CircularXRef(1234).to_string(),
            "Cross-reference section at offset 1234 visited twice"
        );
    }
}
