//! PDF stream filter implementations
//!
//! Bit-level codecs used by the filter pipeline, according to
//! ISO 32000-1:2008 Section 7.4

pub(crate) mod bit_reader;
pub mod ccitt;
pub mod lzw;

pub use ccitt::{decode_ccitt, CcittDecodeParams, CcittK};
pub use lzw::decode_lzw;
