//! Linear PDF writer
//!
//! Writes a header, a run of indirect objects, one classic cross-reference
//! table and the trailer. Every value is serialized so that reading it back
//! yields an equal [`PdfObject`].

use crate::error::{PdfError, Result};
use crate::parser::objects::{PdfDictionary, PdfName, PdfObject, PdfString};
use crate::parser::PdfVersion;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct PdfWriter<W: Write> {
    writer: W,
    version: PdfVersion,
    /// Object number to (byte offset, generation)
    xref_positions: BTreeMap<u32, (u64, u16)>,
    current_position: u64,
    header_written: bool,
}

impl PdfWriter<BufWriter<File>> {
    /// Create a writer for a new file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new_with_writer(BufWriter::new(file)))
    }
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self {
            writer,
            version: PdfVersion::new(1, 7),
            xref_positions: BTreeMap::new(),
            current_position: 0,
            header_written: false,
        }
    }

    /// Set the version written in the header
    pub fn with_version(mut self, version: PdfVersion) -> Self {
        self.version = version;
        self
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.current_position
    }

    fn write_header(&mut self) -> Result<()> {
        let header = format!("%PDF-{}\n", self.version);
        self.write_bytes(header.as_bytes())?;
        // Binary comment to ensure file is treated as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;
        self.header_written = true;
        Ok(())
    }

    /// Write `obj_num gen obj ... endobj`.
    ///
    /// A stream's `/Length` is replaced with the exact size of its data.
    pub fn write_object(&mut self, obj_num: u32, gen_num: u16, object: &PdfObject) -> Result<()> {
        if obj_num == 0 || self.xref_positions.contains_key(&obj_num) {
            return Err(PdfError::InvalidObjectReference(obj_num, gen_num));
        }
        if !self.header_written {
            self.write_header()?;
        }

        self.xref_positions
            .insert(obj_num, (self.current_position, gen_num));

        let header = format!("{obj_num} {gen_num} obj\n");
        self.write_bytes(header.as_bytes())?;

        match object {
            PdfObject::Stream(stream) => {
                let mut dict = stream.dict.clone();
                dict.insert("Length", PdfObject::Integer(stream.data.len() as i64));
                self.write_value(&PdfObject::Dictionary(dict))?;
                self.write_bytes(b"\nstream\n")?;
                self.write_bytes(&stream.data)?;
                self.write_bytes(b"\nendstream")?;
            }
            other => self.write_value(other)?,
        }

        self.write_bytes(b"\nendobj\n")?;
        Ok(())
    }

    /// Write the cross-reference table, trailer and `%%EOF`, and hand back the
    /// underlying writer. `/Size` is filled in; `/Root` must be present.
    pub fn finish(mut self, trailer: PdfDictionary) -> Result<W> {
        if !trailer.contains_key("Root") {
            return Err(PdfError::InvalidStructure(
                "trailer has no /Root".to_string(),
            ));
        }
        if !self.header_written {
            self.write_header()?;
        }

        let xref_position = self.current_position;
        self.write_xref()?;

        let size = self.xref_positions.keys().max().map_or(1, |max| max + 1);
        let mut trailer = trailer;
        trailer.insert("Size", PdfObject::Integer(i64::from(size)));

        self.write_bytes(b"trailer\n")?;
        self.write_value(&PdfObject::Dictionary(trailer))?;
        self.write_bytes(b"\nstartxref\n")?;
        self.write_bytes(xref_position.to_string().as_bytes())?;
        self.write_bytes(b"\n%%EOF\n")?;

        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_xref(&mut self) -> Result<()> {
        let max_obj_num = self.xref_positions.keys().max().copied().unwrap_or(0);

        // One subsection from 0 to max, gaps become free entries
        let mut table = format!("xref\n0 {}\n", max_obj_num + 1);
        table.push_str("0000000000 65535 f \n");
        for obj_num in 1..=max_obj_num {
            match self.xref_positions.get(&obj_num) {
                Some((position, generation)) => {
                    table.push_str(&format!("{position:010} {generation:05} n \n"));
                }
                None => table.push_str("0000000000 00000 f \n"),
            }
        }

        self.write_bytes(table.as_bytes())
    }

    fn write_value(&mut self, object: &PdfObject) -> Result<()> {
        let mut buffer = Vec::new();
        write_object_value(&mut buffer, object)?;
        self.write_bytes(&buffer)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

/// Serialize a value the way it appears inside an indirect object
pub fn write_object_value<W: Write + ?Sized>(out: &mut W, object: &PdfObject) -> io::Result<()> {
    match object {
        PdfObject::Null => out.write_all(b"null"),
        PdfObject::Boolean(b) => out.write_all(if *b { b"true" } else { b"false" }),
        PdfObject::Integer(i) => write!(out, "{i}"),
        PdfObject::Real(f) => out.write_all(format_real(*f).as_bytes()),
        PdfObject::String(s) => write_string(out, s),
        PdfObject::Name(n) => write_name(out, n),
        PdfObject::Array(array) => {
            out.write_all(b"[")?;
            for (i, obj) in array.0.iter().enumerate() {
                if i > 0 {
                    out.write_all(b" ")?;
                }
                write_object_value(out, obj)?;
            }
            out.write_all(b"]")
        }
        PdfObject::Dictionary(dict) => write_dictionary(out, dict),
        PdfObject::Stream(stream) => {
            write_dictionary(out, &stream.dict)?;
            out.write_all(b"\nstream\n")?;
            out.write_all(&stream.data)?;
            out.write_all(b"\nendstream")
        }
        PdfObject::Reference(obj_num, gen_num) => write!(out, "{obj_num} {gen_num} R"),
    }
}

fn write_dictionary<W: Write + ?Sized>(out: &mut W, dict: &PdfDictionary) -> io::Result<()> {
    // Sorted for stable output
    let mut entries: Vec<_> = dict.0.iter().collect();
    entries.sort_by(|a, b| a.0 .0.cmp(&b.0 .0));

    out.write_all(b"<<")?;
    for (key, value) in entries {
        out.write_all(b" ")?;
        write_name(out, key)?;
        out.write_all(b" ")?;
        write_object_value(out, value)?;
    }
    out.write_all(b" >>")
}

/// Reals never use exponent notation; integral values keep a `.0` so they read back as reals
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let mut text = format!("{value}");
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Names hold one char per source byte, so chars up to U+00FF map back to a
/// single byte. Anything wider is written as its UTF-8 bytes.
fn write_name<W: Write + ?Sized>(out: &mut W, name: &PdfName) -> io::Result<()> {
    out.write_all(b"/")?;
    let mut utf8 = [0u8; 4];
    for ch in name.as_str().chars() {
        let bytes: &[u8] = match u8::try_from(ch) {
            Ok(byte) => {
                utf8[0] = byte;
                &utf8[..1]
            }
            Err(_) => ch.encode_utf8(&mut utf8).as_bytes(),
        };
        for &byte in bytes {
            let plain = matches!(byte, 0x21..=0x7E)
                && !matches!(
                    byte,
                    b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
                );
            if plain {
                out.write_all(&[byte])?;
            } else {
                write!(out, "#{byte:02X}")?;
            }
        }
    }
    Ok(())
}

fn write_string<W: Write + ?Sized>(out: &mut W, string: &PdfString) -> io::Result<()> {
    if string.hex {
        out.write_all(b"<")?;
        for byte in &string.bytes {
            write!(out, "{byte:02X}")?;
        }
        return out.write_all(b">");
    }

    out.write_all(b"(")?;
    for &byte in &string.bytes {
        match byte {
            b'(' | b')' | b'\\' => out.write_all(&[b'\\', byte])?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            0x08 => out.write_all(b"\\b")?,
            0x0C => out.write_all(b"\\f")?,
            0x20..=0x7E => out.write_all(&[byte])?,
            _ => write!(out, "\\{byte:03o}")?,
        }
    }
    out.write_all(b")")
}
