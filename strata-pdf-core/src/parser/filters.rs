//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1 Section 7.4

use super::filter_impls::ccitt::{decode_ccitt, CcittDecodeParams};
use super::filter_impls::lzw::decode_lzw;
use super::lexer::hex_value;
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

#[cfg(feature = "compression")]
use flate2::read::{DeflateDecoder, ZlibDecoder};
#[cfg(feature = "compression")]
use std::io::Read;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// ASCII hex decode
    ASCIIHexDecode,

    /// ASCII 85 decode
    ASCII85Decode,

    /// LZW decode
    LZWDecode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// Run length decode
    RunLengthDecode,

    /// CCITT fax decode
    CCITTFaxDecode,

    /// JBIG2 decode
    JBIG2Decode,

    /// DCT decode (JPEG)
    DCTDecode,

    /// JPX decode (JPEG 2000)
    JPXDecode,

    /// Crypt filter
    Crypt,
}

impl Filter {
    /// Parse filter from its full or abbreviated (inline image) name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    /// Canonical name, used to label decode errors
    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::LZWDecode => "LZWDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::DCTDecode => "DCTDecode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
        }
    }
}

/// Decode stream data according to specified filters
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let filters = stream_filters(dict)?;
    if filters.is_empty() {
        return Ok(data.to_vec());
    }

    let params = decode_params(dict, filters.len())?;

    let mut result = data.to_vec();
    for (filter, params) in filters.into_iter().zip(params) {
        result = apply_filter(&result, filter, params)?;
    }

    Ok(result)
}

/// Normalize `/Filter` (a name or an array of names) into an ordered list
pub fn stream_filters(dict: &PdfDictionary) -> ParseResult<Vec<Filter>> {
    let names: Vec<&str> = match dict.get("Filter") {
        None | Some(PdfObject::Null) => return Ok(Vec::new()),
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => array
            .0
            .iter()
            .map(|obj| match obj {
                PdfObject::Name(name) => Ok(name.as_str()),
                other => Err(ParseError::UnsupportedFilter(format!(
                    "filter array entry of type {}",
                    other.type_name()
                ))),
            })
            .collect::<ParseResult<_>>()?,
        Some(other) => {
            return Err(ParseError::UnsupportedFilter(format!(
                "/Filter of type {}",
                other.type_name()
            )))
        }
    };

    names
        .into_iter()
        .map(|name| {
            Filter::from_name(name).ok_or_else(|| ParseError::UnsupportedFilter(name.to_string()))
        })
        .collect()
}

/// One optional parameter dictionary per filter stage
fn decode_params(dict: &PdfDictionary, stages: usize) -> ParseResult<Vec<Option<&PdfDictionary>>> {
    let mut params = vec![None; stages];

    match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        None | Some(PdfObject::Null) => {}
        Some(PdfObject::Dictionary(single)) => params[0] = Some(single),
        Some(PdfObject::Array(array)) => {
            for (slot, entry) in params.iter_mut().zip(&array.0) {
                *slot = match entry {
                    PdfObject::Dictionary(d) => Some(d),
                    PdfObject::Null => None,
                    other => {
                        return Err(ParseError::UnsupportedFilter(format!(
                            "/DecodeParms entry of type {}",
                            other.type_name()
                        )))
                    }
                };
            }
        }
        Some(other) => {
            tracing::warn!(
                kind = other.type_name(),
                "Ignoring /DecodeParms that is neither a dictionary nor an array"
            );
        }
    }

    Ok(params)
}

/// Apply a single filter to data
pub fn apply_filter(
    data: &[u8],
    filter: Filter,
    params: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => {
            let inflated = decode_flate(data)?;
            apply_predictor(inflated, params, filter)
        }
        Filter::LZWDecode => {
            let early_change = params
                .and_then(|p| p.get("EarlyChange"))
                .and_then(|v| v.as_integer())
                .unwrap_or(1)
                != 0;
            let expanded = decode_lzw(data, early_change)?;
            apply_predictor(expanded, params, filter)
        }
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
        Filter::RunLengthDecode => decode_run_length(data),
        Filter::CCITTFaxDecode => {
            let params = params
                .map(CcittDecodeParams::from_dict)
                .unwrap_or_default();
            decode_ccitt(data, &params)
        }
        // Image codecs are decoded by the consumer
        Filter::DCTDecode | Filter::JPXDecode | Filter::JBIG2Decode => Ok(data.to_vec()),
        Filter::Crypt => {
            match params.and_then(|p| p.get("Name")).and_then(|n| n.as_name()) {
                None => Ok(data.to_vec()),
                Some(name) if name.as_str() == "Identity" => Ok(data.to_vec()),
                Some(_) => Err(ParseError::EncryptionNotSupported),
            }
        }
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let zlib_error = match ZlibDecoder::new(data).read_to_end(&mut result) {
        Ok(_) => return Ok(result),
        Err(e) => e,
    };

    // Some producers omit or damage the zlib wrapper
    let mut raw = Vec::new();
    match DeflateDecoder::new(data).read_to_end(&mut raw) {
        Ok(_) if !raw.is_empty() => {
            tracing::debug!("FlateDecode recovered with raw deflate after zlib error");
            Ok(raw)
        }
        _ => Err(ParseError::filter("FlateDecode", zlib_error.to_string())),
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    Err(ParseError::filter(
        "FlateDecode",
        "requires the 'compression' feature",
    ))
}

/// Predictor settings shared by Flate and LZW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(dict: &PdfDictionary) -> Self {
        let get = |key: &str, default: usize| {
            dict.get(key)
                .and_then(|v| v.as_integer())
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v > 0)
                .unwrap_or(default)
        };

        Self {
            predictor: dict
                .get("Predictor")
                .and_then(|v| v.as_integer())
                .unwrap_or(1),
            colors: get("Colors", 1),
            bits_per_component: get("BitsPerComponent", 8),
            columns: get("Columns", 1),
        }
    }

    /// `None` when the product overflows
    fn bytes_per_pixel(&self) -> Option<usize> {
        let bits = self.colors.checked_mul(self.bits_per_component)?;
        Some(bits.div_ceil(8).max(1))
    }

    /// `None` when the product overflows
    fn row_bytes(&self) -> Option<usize> {
        let bits = self
            .columns
            .checked_mul(self.colors)?
            .checked_mul(self.bits_per_component)?;
        Some(bits.div_ceil(8))
    }
}

fn apply_predictor(
    data: Vec<u8>,
    params: Option<&PdfDictionary>,
    filter: Filter,
) -> ParseResult<Vec<u8>> {
    let params = match params {
        Some(dict) => PredictorParams::from_dict(dict),
        None => return Ok(data),
    };

    match params.predictor {
        p if p <= 1 => Ok(data),
        2 => Ok(apply_tiff_predictor(data, &params)),
        p if p >= 10 => apply_png_predictor(data, &params, filter),
        p => {
            tracing::warn!(predictor = p, "Unknown predictor, leaving data unmodified");
            Ok(data)
        }
    }
}

/// Undo PNG row filters.
///
/// Every row carries a one-byte tag; reconstruction runs row by row against
/// the previous reconstructed row, starting from an all-zero row.
pub fn apply_png_predictor(
    data: Vec<u8>,
    params: &PredictorParams,
    filter: Filter,
) -> ParseResult<Vec<u8>> {
    let layout = params.row_bytes().and_then(|row_bytes| {
        let stride = row_bytes.checked_add(1)?;
        Some((row_bytes, stride, params.bytes_per_pixel()?))
    });
    let (row_bytes, stride, bpp) = match layout {
        Some((row_bytes, stride, bpp))
            if row_bytes > 0 && !data.is_empty() && data.len() % stride == 0 =>
        {
            (row_bytes, stride, bpp)
        }
        _ => {
            tracing::warn!(
                len = data.len(),
                columns = params.columns,
                colors = params.colors,
                bpc = params.bits_per_component,
                "PNG predictor size mismatch, leaving data unmodified"
            );
            return Ok(data);
        }
    };

    let mut output = Vec::with_capacity(data.len() / stride * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    let mut row = vec![0u8; row_bytes];

    for chunk in data.chunks_exact(stride) {
        let tag = chunk[0];
        row.copy_from_slice(&chunk[1..]);

        match tag {
            0 => {}
            1 => {
                for i in bpp..row_bytes {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_bytes {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { u16::from(row[i - bpp]) } else { 0 };
                    let up = u16::from(prev_row[i]);
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, prev_row[i], up_left));
                }
            }
            other => {
                return Err(ParseError::filter(
                    filter.name(),
                    format!("invalid PNG predictor tag {other}"),
                ))
            }
        }

        output.extend_from_slice(&row);
        std::mem::swap(&mut prev_row, &mut row);
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// TIFF predictor 2: horizontal differencing within each row
fn apply_tiff_predictor(mut data: Vec<u8>, params: &PredictorParams) -> Vec<u8> {
    let row_bytes = match params.row_bytes() {
        Some(row_bytes) if row_bytes > 0 && data.len() % row_bytes == 0 => row_bytes,
        row_bytes => {
            tracing::warn!(
                len = data.len(),
                row_bytes = ?row_bytes,
                "TIFF predictor size mismatch, leaving data unmodified"
            );
            return data;
        }
    };

    match params.bits_per_component {
        8 => {
            let colors = params.colors;
            for row in data.chunks_exact_mut(row_bytes) {
                for i in colors..row_bytes {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
        }
        16 => {
            let step = params.colors * 2;
            for row in data.chunks_exact_mut(row_bytes) {
                for i in (step..row_bytes.saturating_sub(1)).step_by(2) {
                    let prev = u16::from_be_bytes([row[i - step], row[i - step + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    let [hi, lo] = cur.wrapping_add(prev).to_be_bytes();
                    row[i] = hi;
                    row[i + 1] = lo;
                }
            }
        }
        bpc => {
            tracing::warn!(bpc, "TIFF predictor unsupported for this bit depth");
        }
    }

    data
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if ch.is_ascii_whitespace() || ch == b'\0' {
            continue;
        }

        let value = hex_value(ch).ok_or_else(|| {
            ParseError::filter(
                "ASCIIHexDecode",
                format!("invalid hex digit: {}", ch as char),
            )
        })?;

        match pending.take() {
            Some(high) => result.push((high << 4) | value),
            None => pending = Some(value),
        }
    }

    // Odd number of digits, pad with 0
    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let mut chars = data.iter().copied().filter(|b| !b.is_ascii_whitespace());

    while let Some(c) = chars.next() {
        match c {
            b'~' => match chars.next() {
                Some(b'>') | None => break,
                Some(other) => {
                    return Err(ParseError::filter(
                        "ASCII85Decode",
                        format!("invalid end marker ~{}", other as char),
                    ))
                }
            },
            b'z' if count == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = c - b'!';
                count += 1;
                if count == 5 {
                    result.extend_from_slice(&ascii85_group_value(&group)?.to_be_bytes());
                    count = 0;
                }
            }
            _ => {
                return Err(ParseError::filter(
                    "ASCII85Decode",
                    format!("invalid character: {}", c as char),
                ))
            }
        }
    }

    // Final partial group: pad with 'u' and keep count - 1 bytes
    match count {
        0 => {}
        1 => {
            return Err(ParseError::filter(
                "ASCII85Decode",
                "final group has a single character",
            ))
        }
        n => {
            for slot in group.iter_mut().skip(n) {
                *slot = b'u' - b'!';
            }
            let bytes = ascii85_group_value(&group)?.to_be_bytes();
            result.extend_from_slice(&bytes[..n - 1]);
        }
    }

    Ok(result)
}

fn ascii85_group_value(group: &[u8; 5]) -> ParseResult<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value)
        .map_err(|_| ParseError::filter("ASCII85Decode", "group value exceeds 2^32 - 1"))
}

/// Decode RunLengthDecode data
fn decode_run_length(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                let end = (i + count).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let byte = data.get(i).copied().ok_or_else(|| {
                    ParseError::filter("RunLengthDecode", "repeat run missing its byte")
                })?;
                i += 1;
                let count = 257 - usize::from(length);
                result.extend(std::iter::repeat(byte).take(count));
            }
        }
    }

    Ok(result)
}
