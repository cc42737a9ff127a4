//! PDF Document - the object store
//!
//! `PdfDocument` is the entry point for reading a PDF. It resolves object
//! numbers through the merged cross-reference table, following either a direct
//! byte offset or an object stream, and memoizes every result.
//!
//! # Architecture
//!
//! - **PdfDocument**: resolution, page access and lifecycle
//! - **ResourceManager**: write-once object cache with interior mutability
//! - **PdfReader**: the file bytes, header and cross-reference table
//! - **PageTreeWalker**: flattens the page tree once, at open
//!
//! Resolution takes `&self`. The caches live in `RefCell`s, so a document is
//! meant to be used from one thread at a time.
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_pdf::parser::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open("document.pdf")?;
//!
//! let metadata = document.metadata()?;
//! println!("Title: {:?}", metadata.title);
//!
//! let catalog = document.catalog()?;
//! if let Some(pages) = catalog.get("Pages") {
//!     let pages = document.resolve_object(pages)?;
//!     println!("Page tree root: {pages}");
//! }
//! # Ok(())
//! # }
//! ```

use super::filters;
use super::header::PdfVersion;
use super::object_stream::ObjectStream;
use super::objects::{PdfArray, PdfDictionary, PdfObject, PdfStream};
use super::page_tree::{PageTreeWalker, ParsedPage};
use super::reader::PdfReader;
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

/// Resource manager for PDF object caching.
///
/// Holds every object resolved so far, keyed by object number, plus the
/// decoded object streams compressed objects are read from. An object number
/// is written at most once; a second insert keeps the first value.
///
/// # Example
///
/// ```rust
/// use strata_pdf::parser::{PdfObject, ResourceManager};
///
/// let resources = ResourceManager::new();
/// resources.cache_object(10, PdfObject::Integer(42));
///
/// // Later writes do not replace the cached value
/// let kept = resources.cache_object(10, PdfObject::Integer(7));
/// assert_eq!(kept, PdfObject::Integer(42));
/// ```
#[derive(Debug, Default)]
pub struct ResourceManager {
    /// Resolved objects by object number
    object_cache: RefCell<HashMap<u32, PdfObject>>,
    /// Decoded object streams by the stream's object number
    object_streams: RefCell<HashMap<u32, Rc<ObjectStream>>>,
}

impl ResourceManager {
    /// Create a new resource manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an object from cache if available.
    pub fn get_cached(&self, obj_num: u32) -> Option<PdfObject> {
        self.object_cache.borrow().get(&obj_num).cloned()
    }

    /// Cache an object and return the value now associated with `obj_num`.
    ///
    /// If the number is already cached the existing value wins.
    pub fn cache_object(&self, obj_num: u32, obj: PdfObject) -> PdfObject {
        self.object_cache
            .borrow_mut()
            .entry(obj_num)
            .or_insert(obj)
            .clone()
    }

    pub(crate) fn get_object_stream(&self, obj_num: u32) -> Option<Rc<ObjectStream>> {
        self.object_streams.borrow().get(&obj_num).cloned()
    }

    pub(crate) fn cache_object_stream(&self, obj_num: u32, stream: ObjectStream) -> Rc<ObjectStream> {
        self.object_streams
            .borrow_mut()
            .entry(obj_num)
            .or_insert_with(|| Rc::new(stream))
            .clone()
    }

    /// Number of cached objects
    pub fn cached_count(&self) -> usize {
        self.object_cache.borrow().len()
    }

    /// Clear all cached objects and object streams.
    pub fn clear_cache(&self) {
        self.object_cache.borrow_mut().clear();
        self.object_streams.borrow_mut().clear();
    }
}

/// Document information from the `/Info` dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub modification_date: Option<DateTime<FixedOffset>>,
    /// Header version, e.g. "1.7"
    pub version: String,
    pub page_count: usize,
}

/// A parsed PDF document.
///
/// Built once from an immutable buffer. Opening reads the header and the
/// cross-reference chain, resolves the catalog and walks the page tree;
/// everything else is resolved on demand.
///
/// # Example
///
/// ```rust,no_run
/// use strata_pdf::parser::PdfDocument;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let document = PdfDocument::open("document.pdf")?;
///
/// for page in document.pages() {
///     let content = document.page_content(page.number)?;
///     println!("page {}: {} content bytes", page.number, content.len());
/// }
///
/// // Objects missing from the cross-reference table read as null
/// assert!(document.get_object(999_999)?.is_null());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PdfDocument {
    /// `None` once the document has been closed
    reader: Option<PdfReader>,
    resources: ResourceManager,
    pages: Vec<ParsedPage>,
    catalog: PdfDictionary,
    /// Object numbers currently being resolved
    in_progress: RefCell<HashSet<u32>>,
    /// Current nesting of `get_object` calls
    depth: Cell<usize>,
}

impl PdfDocument {
    /// Open a PDF file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::from_reader(PdfReader::open(path)?)
    }

    /// Open a PDF file with custom parsing options
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> ParseResult<Self> {
        Self::from_reader(PdfReader::open_with_options(path, options)?)
    }

    /// Read a PDF held in memory
    pub fn from_bytes(data: Vec<u8>) -> ParseResult<Self> {
        Self::from_reader(PdfReader::from_bytes(data)?)
    }

    /// Read a PDF held in memory with custom parsing options
    pub fn from_bytes_with_options(data: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        Self::from_reader(PdfReader::from_bytes_with_options(data, options)?)
    }

    /// Build a document over an already loaded reader.
    ///
    /// Fails when `/Root` is missing or is not a dictionary, or when the
    /// catalog has no `/Pages`.
    pub fn from_reader(reader: PdfReader) -> ParseResult<Self> {
        let root = reader
            .trailer()
            .get("Root")
            .cloned()
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))?;

        let mut document = Self {
            reader: Some(reader),
            resources: ResourceManager::new(),
            pages: Vec::new(),
            catalog: PdfDictionary::new(),
            in_progress: RefCell::new(HashSet::new()),
            depth: Cell::new(0),
        };

        document.catalog = match document.resolve_object(&root)? {
            PdfObject::Dictionary(catalog) => catalog,
            other => {
                return Err(ParseError::InvalidTrailer(format!(
                    "/Root is a {}, not a dictionary",
                    other.type_name()
                )))
            }
        };

        let pages_root = document
            .catalog
            .get("Pages")
            .cloned()
            .ok_or_else(|| ParseError::MissingKey("Pages".to_string()))?;
        let max_depth = document.options()?.max_recursion_depth;
        document.pages = PageTreeWalker::new(&document, max_depth).collect(&pages_root)?;

        Ok(document)
    }

    fn reader(&self) -> ParseResult<&PdfReader> {
        self.reader.as_ref().ok_or(ParseError::DocumentClosed)
    }

    /// Parsing options the document was opened with
    pub fn options(&self) -> ParseResult<&ParseOptions> {
        Ok(self.reader()?.options())
    }

    /// Get the PDF version from the header
    pub fn version(&self) -> ParseResult<PdfVersion> {
        Ok(self.reader()?.version())
    }

    /// The merged cross-reference table
    pub fn xref(&self) -> ParseResult<&XRefTable> {
        Ok(self.reader()?.xref())
    }

    /// The merged trailer dictionary
    pub fn trailer(&self) -> ParseResult<&PdfDictionary> {
        Ok(self.reader()?.trailer())
    }

    /// The document catalog (`/Root`)
    pub fn catalog(&self) -> ParseResult<&PdfDictionary> {
        self.reader()?;
        Ok(&self.catalog)
    }

    /// The object cache
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Resolve an object by number.
    ///
    /// Numbers missing from the cross-reference table, or marked free, resolve
    /// to [`PdfObject::Null`]. The result is cached and later calls return the
    /// cached value.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be parsed, if resolving it leads
    /// back to itself, or after [`PdfDocument::close`].
    pub fn get_object(&self, obj_num: u32) -> ParseResult<PdfObject> {
        let reader = self.reader()?;

        if let Some(object) = self.resources.get_cached(obj_num) {
            tracing::trace!(obj_num, "Object cache hit");
            return Ok(object);
        }

        let entry = match reader.xref().get_entry(obj_num) {
            Some(entry) if !entry.is_free() => *entry,
            _ => {
                tracing::trace!(obj_num, "Object not in use, resolving to null");
                return Ok(self.resources.cache_object(obj_num, PdfObject::Null));
            }
        };

        if !self.in_progress.borrow_mut().insert(obj_num) {
            return Err(ParseError::CircularReference(obj_num));
        }
        let depth = self.depth.get();
        let max_depth = reader.options().max_recursion_depth;
        let result = if depth >= max_depth {
            Err(ParseError::RecursionLimit(max_depth))
        } else {
            self.depth.set(depth + 1);
            let loaded = self.load_entry(reader, obj_num, entry);
            self.depth.set(depth);
            loaded
        };
        self.in_progress.borrow_mut().remove(&obj_num);

        let object = result?;
        tracing::trace!(obj_num, kind = object.type_name(), "Resolved object");
        Ok(self.resources.cache_object(obj_num, object))
    }

    fn load_entry(&self, reader: &PdfReader, obj_num: u32, entry: XRefEntry) -> ParseResult<PdfObject> {
        match entry {
            XRefEntry::InUse { offset, generation } => {
                let resolve_length = |length_num: u32, _gen: u16| -> ParseResult<i64> {
                    self.get_object(length_num)?
                        .as_integer()
                        .ok_or_else(|| {
                            ParseError::syntax(
                                0,
                                format!("stream length object {length_num} is not an integer"),
                            )
                        })
                };
                reader.parse_object_at(offset, obj_num, generation, &resolve_length)
            }
            XRefEntry::Compressed {
                stream_obj_num,
                index,
            } => self.load_compressed(reader, obj_num, stream_obj_num, index as usize),
            XRefEntry::Free { .. } => Ok(PdfObject::Null),
        }
    }

    fn load_compressed(
        &self,
        reader: &PdfReader,
        obj_num: u32,
        stream_obj_num: u32,
        index: usize,
    ) -> ParseResult<PdfObject> {
        let stream = self.object_stream(stream_obj_num)?;
        let options = reader.options();

        let (found, object) = stream.get_object(index, options)?;
        if found == obj_num {
            return Ok(object);
        }

        tracing::warn!(
            obj_num,
            stream = stream_obj_num,
            index,
            found,
            "Object stream index points at another object, searching the header"
        );
        let index = stream.find(obj_num).ok_or_else(|| {
            ParseError::InvalidObjectStream(
                stream_obj_num,
                format!("object {obj_num} is not in the stream"),
            )
        })?;
        Ok(stream.get_object(index, options)?.1)
    }

    fn object_stream(&self, stream_obj_num: u32) -> ParseResult<Rc<ObjectStream>> {
        if let Some(stream) = self.resources.get_object_stream(stream_obj_num) {
            return Ok(stream);
        }

        let stream = match self.get_object(stream_obj_num)? {
            PdfObject::Stream(stream) => self.with_resolved_filters(&stream)?,
            other => {
                return Err(ParseError::InvalidObjectStream(
                    stream_obj_num,
                    format!("expected a stream, found {}", other.type_name()),
                ))
            }
        };
        let parsed = ObjectStream::parse(stream_obj_num, &stream)?;
        Ok(self.resources.cache_object_stream(stream_obj_num, parsed))
    }

    /// Resolve a value, following references until a direct object is reached.
    ///
    /// Non-references are returned unchanged.
    pub fn resolve_object(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        let max_hops = self.options()?.max_recursion_depth;
        let mut current = match obj {
            PdfObject::Reference(obj_num, _) => self.get_object(*obj_num)?,
            other => return Ok(other.clone()),
        };

        let mut hops = 1;
        while let PdfObject::Reference(obj_num, _) = current {
            if hops >= max_hops {
                return Err(ParseError::RecursionLimit(max_hops));
            }
            current = self.get_object(obj_num)?;
            hops += 1;
        }
        Ok(current)
    }

    /// Copy of `stream` whose `/Filter` and `/DecodeParms` hold direct values
    fn with_resolved_filters(&self, stream: &PdfStream) -> ParseResult<PdfStream> {
        let mut dict = stream.dict.clone();
        for key in ["Filter", "DecodeParms", "DP"] {
            let Some(value) = stream.dict.get(key) else {
                continue;
            };
            let resolved = match self.resolve_object(value)? {
                PdfObject::Array(items) => PdfObject::Array(PdfArray(
                    items
                        .0
                        .iter()
                        .map(|item| self.resolve_entries(item))
                        .collect::<ParseResult<_>>()?,
                )),
                other => self.resolve_entries(&other)?,
            };
            dict.insert(key, resolved);
        }
        Ok(PdfStream {
            dict,
            data: stream.data.clone(),
        })
    }

    /// Resolve an object and, if it is a dictionary, its values one level down
    fn resolve_entries(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        match self.resolve_object(obj)? {
            PdfObject::Dictionary(dict) => {
                let mut resolved = PdfDictionary::new();
                for (key, value) in dict.iter() {
                    resolved.insert(key.as_str(), self.resolve_object(value)?);
                }
                Ok(PdfObject::Dictionary(resolved))
            }
            other => Ok(other),
        }
    }

    /// Decode a stream, resolving indirect `/Filter` and `/DecodeParms` first.
    pub fn decode_stream(&self, stream: &PdfStream) -> ParseResult<Vec<u8>> {
        let resolved = self.with_resolved_filters(stream)?;
        filters::decode_stream(&resolved.data, &resolved.dict)
    }

    /// Get the number of pages in the document
    pub fn num_pages(&self) -> ParseResult<usize> {
        self.reader()?;
        Ok(self.pages.len())
    }

    /// Get a page by 1-based number.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::PageOutOfRange`] for 0 or a number past the last page.
    pub fn get_page(&self, number: usize) -> ParseResult<ParsedPage> {
        self.reader()?;
        number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .cloned()
            .ok_or(ParseError::PageOutOfRange {
                requested: number,
                count: self.pages.len(),
            })
    }

    /// All pages in document order
    pub fn pages(&self) -> &[ParsedPage] {
        &self.pages
    }

    /// Decoded `/Contents` of a page. Multiple content streams are joined with
    /// a newline; a page without contents yields an empty buffer.
    pub fn page_content(&self, number: usize) -> ParseResult<Vec<u8>> {
        let page = self.get_page(number)?;
        let Some(contents) = page.dict.get("Contents") else {
            return Ok(Vec::new());
        };

        let streams = match self.resolve_object(contents)? {
            PdfObject::Stream(stream) => vec![stream],
            PdfObject::Array(parts) => {
                let mut streams = Vec::with_capacity(parts.len());
                for part in &parts.0 {
                    match self.resolve_object(part)? {
                        PdfObject::Stream(stream) => streams.push(stream),
                        other => tracing::warn!(
                            page = number,
                            found = other.type_name(),
                            "Skipping content entry that is not a stream"
                        ),
                    }
                }
                streams
            }
            PdfObject::Null => Vec::new(),
            other => {
                return Err(ParseError::syntax(
                    0,
                    format!("page {number} /Contents is a {}", other.type_name()),
                ))
            }
        };

        let mut content = Vec::new();
        for (i, stream) in streams.iter().enumerate() {
            if i > 0 {
                content.push(b'\n');
            }
            content.extend_from_slice(&self.decode_stream(stream)?);
        }
        Ok(content)
    }

    /// Read the `/Info` dictionary.
    ///
    /// A missing or unresolvable `/Info` gives empty text fields.
    pub fn metadata(&self) -> ParseResult<DocumentMetadata> {
        let mut metadata = DocumentMetadata {
            version: self.version()?.to_string(),
            page_count: self.num_pages()?,
            ..Default::default()
        };

        let info = match self.trailer()?.get("Info") {
            Some(info) => match self.resolve_object(info) {
                Ok(PdfObject::Dictionary(dict)) => dict,
                Ok(_) => return Ok(metadata),
                Err(err) => {
                    tracing::warn!(error = %err, "Ignoring unreadable /Info dictionary");
                    return Ok(metadata);
                }
            },
            None => return Ok(metadata),
        };

        let text = |key: &str| -> Option<String> {
            let value = self.resolve_object(info.get(key)?).ok()?;
            value.as_string().map(|s| s.to_text())
        };

        metadata.title = text("Title");
        metadata.author = text("Author");
        metadata.subject = text("Subject");
        metadata.keywords = text("Keywords");
        metadata.creator = text("Creator");
        metadata.producer = text("Producer");
        metadata.creation_date = text("CreationDate").as_deref().and_then(parse_pdf_date);
        metadata.modification_date = text("ModDate").as_deref().and_then(parse_pdf_date);

        Ok(metadata)
    }

    /// Release the file buffer and caches. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            self.resources.clear_cache();
            self.pages.clear();
            self.catalog = PdfDictionary::new();
            tracing::debug!("Document closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

/// Parse a date string of the form `D:YYYYMMDDHHmmSSOHH'mm'`.
///
/// Everything after the year is optional; a missing zone means UTC.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, zone) = text.split_at(digits_end);

    let year: i32 = digits.get(..4)?.parse().ok()?;
    let field = |start: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + 2) {
            Some(value) => value.parse().ok(),
            None => Some(default),
        }
    };

    let date = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?;
    let time = date.and_hms_opt(field(8, 0)?, field(10, 0)?, field(12, 0)?)?;
    let offset = FixedOffset::east_opt(zone_offset_seconds(zone))?;
    time.and_local_timezone(offset).single()
}

fn zone_offset_seconds(zone: &str) -> i32 {
    let mut chars = zone.chars();
    let sign = match chars.next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return 0,
    };
    let digits: String = chars.filter(char::is_ascii_digit).collect();
    let hours: i32 = digits.get(..2).and_then(|h| h.parse().ok()).unwrap_or(0);
    let minutes: i32 = digits.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
    sign * (hours * 3600 + minutes * 60)
}
