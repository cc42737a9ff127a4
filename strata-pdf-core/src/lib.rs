//! # strata-pdf
//!
//! The reading core of a PDF toolchain: tokenizer, object parser, stream
//! filters, cross-reference resolution and page tree traversal, plus a small
//! linear writer.
//!
//! ## Features
//!
//! - **Lazy object store**: objects are resolved on demand through the
//!   cross-reference table and cached by object number
//! - **Incremental updates**: classic tables, cross-reference streams and
//!   hybrid files, merged across the whole `/Prev` chain
//! - **Stream filters**: Flate, LZW, ASCIIHex, ASCII85, RunLength and CCITT fax,
//!   with PNG and TIFF predictors
//! - **Bounded traversal**: cyclic `/Prev` chains, reference loops and deep
//!   nesting produce errors rather than hangs
//!
//! ## Parsing PDFs
//!
//! ```rust,no_run
//! use strata_pdf::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open("document.pdf")?;
//!
//! println!("Version: {}", document.version()?);
//! println!("Pages: {}", document.num_pages()?);
//!
//! for n in 1..=document.num_pages()? {
//!     let page = document.get_page(n)?;
//!     println!("Page {n} size: {}x{} points", page.width(), page.height());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod parser;
pub mod writer;

pub use error::{PdfError, Result};
pub use parser::{
    DocumentMetadata, ParseError, ParseOptions, ParsedPage, PdfDocument, PdfObject, Rectangle,
};
pub use writer::PdfWriter;

/// Current version of strata-pdf
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
