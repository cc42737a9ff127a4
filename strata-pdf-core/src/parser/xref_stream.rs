//! Cross-reference stream support for PDF 1.5+
//!
//! This module implements cross-reference streams according to
//! ISO 32000-1:2008 Section 7.5.8 (Cross-Reference Streams).
//!
//! Cross-reference streams are an alternative to traditional xref tables,
//! providing more compact representation and supporting compressed object streams.

use super::objects::{PdfDictionary, PdfObject, PdfStream};
use super::xref::XRefEntry;
use super::{ParseError, ParseResult};

/// Decoded cross-reference stream: field widths, subsections and record bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefStream {
    /// Field widths from the W array
    widths: [usize; 3],
    /// Subsections from the Index array as (first object number, count)
    index: Vec<(u32, u32)>,
    /// Decoded stream data
    data: Vec<u8>,
}

impl XRefStream {
    /// Decode a cross-reference stream object
    pub fn parse(stream: &PdfStream) -> ParseResult<Self> {
        let dict = &stream.dict;

        match dict.get_type() {
            Some("XRef") => {}
            other => tracing::warn!(
                found = ?other,
                "Cross-reference stream does not declare /Type /XRef"
            ),
        }

        let widths = read_widths(dict)?;
        let index = read_index(dict)?;
        let data = stream.decode()?;

        Ok(Self {
            widths,
            index,
            data,
        })
    }

    pub fn widths(&self) -> [usize; 3] {
        self.widths
    }

    pub fn index(&self) -> &[(u32, u32)] {
        &self.index
    }

    /// Convert the records into xref entries.
    ///
    /// Truncated data is an error in strict mode; otherwise the records that
    /// are present are kept.
    pub fn entries(&self, strict: bool) -> ParseResult<Vec<(u32, XRefEntry)>> {
        let entry_size: usize = self.widths.iter().sum();
        let mut entries = Vec::new();
        let mut records = self.data.chunks_exact(entry_size);

        for &(first, count) in &self.index {
            for i in 0..count {
                let obj_num = first.checked_add(i).ok_or_else(|| {
                    ParseError::InvalidXRef(format!("object number overflow in /Index at {first}"))
                })?;

                let Some(record) = records.next() else {
                    let message = format!(
                        "cross-reference stream data ends at object {obj_num} ({} bytes, {entry_size} per entry)",
                        self.data.len()
                    );
                    if strict {
                        return Err(ParseError::InvalidXRef(message));
                    }
                    tracing::warn!("{message}");
                    return Ok(entries);
                };

                let (type_field, rest) = record.split_at(self.widths[0]);
                let (field2, field3) = rest.split_at(self.widths[1]);

                // A zero-width type field means every record is type 1
                let entry_type = if self.widths[0] == 0 {
                    1
                } else {
                    read_field(type_field)
                };
                let field2 = read_field(field2);
                let field3 = read_field(field3);

                let entry = match entry_type {
                    0 => XRefEntry::Free {
                        next_free: field2 as u32,
                        generation: field3 as u16,
                    },
                    1 => XRefEntry::InUse {
                        offset: field2,
                        generation: field3 as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream_obj_num: field2 as u32,
                        index: field3 as u32,
                    },
                    other => {
                        // Unknown types are treated as references to the null object
                        tracing::warn!(entry_type = other, obj_num, "Ignoring unknown xref entry type");
                        continue;
                    }
                };

                entries.push((obj_num, entry));
            }
        }

        Ok(entries)
    }
}

fn read_widths(dict: &PdfDictionary) -> ParseResult<[usize; 3]> {
    let array = dict
        .get("W")
        .ok_or_else(|| ParseError::MissingKey("W".to_string()))?
        .as_array()
        .ok_or_else(|| ParseError::InvalidXRef("/W must be an array".to_string()))?;

    if array.len() != 3 {
        return Err(ParseError::InvalidXRef(format!(
            "/W must have 3 elements, found {}",
            array.len()
        )));
    }

    let mut widths = [0usize; 3];
    for (slot, obj) in widths.iter_mut().zip(&array.0) {
        *slot = match obj.as_integer() {
            Some(w @ 0..=8) => w as usize,
            _ => {
                return Err(ParseError::InvalidXRef(format!(
                    "invalid /W field width {obj}"
                )))
            }
        };
    }

    if widths.iter().sum::<usize>() == 0 {
        return Err(ParseError::InvalidXRef("/W entry size is 0".to_string()));
    }

    Ok(widths)
}

fn read_index(dict: &PdfDictionary) -> ParseResult<Vec<(u32, u32)>> {
    let as_u32 = |obj: &PdfObject| {
        obj.as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ParseError::InvalidXRef(format!("invalid /Index value {obj}")))
    };

    match dict.get("Index") {
        Some(PdfObject::Array(array)) => {
            if array.len() % 2 != 0 {
                return Err(ParseError::InvalidXRef(
                    "/Index must hold (first, count) pairs".to_string(),
                ));
            }
            array
                .0
                .chunks_exact(2)
                .map(|pair| Ok((as_u32(&pair[0])?, as_u32(&pair[1])?)))
                .collect()
        }
        Some(other) => Err(ParseError::InvalidXRef(format!(
            "/Index must be an array, found {}",
            other.type_name()
        ))),
        None => {
            let size = dict
                .get("Size")
                .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
            Ok(vec![(0, as_u32(size)?)])
        }
    }
}

/// Read a big-endian field; an empty field reads as 0
fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |value, &byte| (value << 8) | u64::from(byte))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfName};

    fn int_array(values: &[i64]) -> PdfObject {
        PdfObject::Array(PdfArray(
            values.iter().map(|&v| PdfObject::Integer(v)).collect(),
        ))
    }

    fn xref_stream(widths: &[i64], size: i64, data: Vec<u8>) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("XRef")));
        dict.insert("W", int_array(widths));
        dict.insert("Size", PdfObject::Integer(size));
        dict.insert("Length", PdfObject::Integer(data.len() as i64));
        PdfStream { dict, data }
    }

    #[test]
    fn test_decode_all_entry_types() {
        let data = vec![
            0, 0x00, 0x00, 0xFF, // free, next 0, gen 255
            1, 0x01, 0x2C, 0x00, // in use at 300
            2, 0x00, 0x05, 0x02, // compressed in 5, index 2
        ];
        let stream = xref_stream(&[1, 2, 1], 3, data);
        let entries = XRefStream::parse(&stream).unwrap().entries(true).unwrap();

        assert_eq!(
            entries,
            vec![
                (
                    0,
                    XRefEntry::Free {
                        next_free: 0,
                        generation: 255
                    }
                ),
                (
                    1,
                    XRefEntry::InUse {
                        offset: 300,
                        generation: 0
                    }
                ),
                (
                    2,
                    XRefEntry::Compressed {
                        stream_obj_num: 5,
                        index: 2
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let stream = xref_stream(&[0, 2, 0], 2, vec![0x00, 0x10, 0x00, 0x20]);
        let entries = XRefStream::parse(&stream).unwrap().entries(true).unwrap();
        assert_eq!(
            entries[1],
            (
                1,
                XRefEntry::InUse {
                    offset: 0x20,
                    generation: 0
                }
            )
        );
    }

    #[test]
    fn test_index_subsections() {
        let mut stream = xref_stream(&[1, 1, 0], 20, vec![1, 10, 1, 20, 1, 30]);
        stream.dict.insert("Index", int_array(&[3, 1, 10, 2]));

        let xref = XRefStream::parse(&stream).unwrap();
        assert_eq!(xref.index(), &[(3, 1), (10, 2)]);

        let numbers: Vec<u32> = xref
            .entries(true)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(numbers, vec![3, 10, 11]);
    }

    #[test]
    fn test_missing_w_is_error() {
        let mut stream = xref_stream(&[1, 2, 1], 1, vec![1, 0, 0, 0]);
        stream.dict.remove("W");
        assert!(matches!(
            XRefStream::parse(&stream),
            Err(ParseError::MissingKey(key)) if key == "W"
        ));
    }

    #[test]
    fn test_invalid_widths() {
        let stream = xref_stream(&[1, 2], 1, vec![]);
        assert!(matches!(
            XRefStream::parse(&stream),
            Err(ParseError::InvalidXRef(_))
        ));

        let stream = xref_stream(&[0, 0, 0], 1, vec![]);
        assert!(XRefStream::parse(&stream).is_err());

        let stream = xref_stream(&[1, 9, 1], 1, vec![]);
        assert!(XRefStream::parse(&stream).is_err());
    }

    #[test]
    fn test_truncated_data() {
        let stream = xref_stream(&[1, 2, 1], 3, vec![1, 0, 10, 0, 1, 0]);
        let xref = XRefStream::parse(&stream).unwrap();

        assert!(matches!(xref.entries(true), Err(ParseError::InvalidXRef(_))));
        assert_eq!(xref.entries(false).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_entry_type_is_skipped() {
        let stream = xref_stream(&[1, 1, 0], 2, vec![7, 0, 1, 9]);
        let entries = XRefStream::parse(&stream).unwrap().entries(true).unwrap();
        assert_eq!(
            entries,
            vec![(
                1,
                XRefEntry::InUse {
                    offset: 9,
                    generation: 0
                }
            )]
        );
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_with_png_up_predictor() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        // Two 4-byte records, each row tagged with the Up filter (2)
        let rows = [2u8, 1, 0, 15, 0, 2, 0, 0, 1, 0];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&rows).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut stream = xref_stream(&[1, 2, 1], 2, compressed);
        stream
            .dict
            .insert("Filter", PdfObject::Name(PdfName::new("FlateDecode")));
        let mut params = PdfDictionary::new();
        params.insert("Predictor", PdfObject::Integer(12));
        params.insert("Columns", PdfObject::Integer(4));
        stream
            .dict
            .insert("DecodeParms", PdfObject::Dictionary(params));

        let entries = XRefStream::parse(&stream).unwrap().entries(true).unwrap();
        assert_eq!(
            entries[0].1,
            XRefEntry::InUse {
                offset: 15,
                generation: 0
            }
        );
        assert_eq!(
            entries[1].1,
            XRefEntry::InUse {
                offset: 16,
                generation: 0
            }
        );
    }
}
