//! End-to-end tests for opening documents and resolving objects
//!
//! Documents are either produced with `PdfWriter` or assembled byte by byte
//! when a test needs incremental updates or cross-reference streams.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::io::Write;
use strata_pdf::parser::{PdfArray, PdfDictionary, PdfName, PdfStream, PdfString, XRefEntry};
use strata_pdf::{ParseError, ParseOptions, PdfDocument, PdfObject, PdfWriter};
use tempfile::tempdir;

fn name(value: &str) -> PdfObject {
    PdfObject::Name(PdfName::new(value))
}

fn dict(entries: Vec<(&str, PdfObject)>) -> PdfObject {
    let mut dict = PdfDictionary::new();
    for (key, value) in entries {
        dict.insert(key, value);
    }
    PdfObject::Dictionary(dict)
}

fn rect(values: [i64; 4]) -> PdfObject {
    PdfObject::Array(PdfArray(values.iter().map(|&v| PdfObject::Integer(v)).collect()))
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Appends indirect objects and remembers where each one starts
struct RawPdf {
    data: Vec<u8>,
    offsets: BTreeMap<u32, usize>,
}

impl RawPdf {
    fn new(version: &str) -> Self {
        Self {
            data: format!("%PDF-{version}\n%\u{e2}\u{e3}\n").into_bytes(),
            offsets: BTreeMap::new(),
        }
    }

    fn object(&mut self, number: u32, body: &[u8]) {
        self.offsets.insert(number, self.data.len());
        self.data
            .extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, number: u32, dict: &str, payload: &[u8]) {
        let mut body = format!("<< {dict} /Length {} >>\nstream\n", payload.len()).into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object(number, &body);
    }

    /// Classic section covering `numbers`, returns its offset
    fn xref_section(&mut self, numbers: &[u32], trailer: &str) -> usize {
        let start = self.data.len();
        let mut section = String::from("xref\n");
        for &number in numbers {
            section.push_str(&format!(
                "{number} 1\n{:010} 00000 n \n",
                self.offsets[&number]
            ));
        }
        section.push_str(&format!("trailer\n<< {trailer} >>\nstartxref\n{start}\n%%EOF\n"));
        self.data.extend_from_slice(section.as_bytes());
        start
    }
}

fn single_page_document() -> Vec<u8> {
    let mut writer = PdfWriter::new_with_writer(Vec::new());
    writer
        .write_object(1, 0, &dict(vec![("Type", name("Catalog")), ("Pages", PdfObject::Reference(2, 0))]))
        .unwrap();
    writer
        .write_object(
            2,
            0,
            &dict(vec![
                ("Type", name("Pages")),
                ("Kids", PdfObject::Array(PdfArray(vec![PdfObject::Reference(3, 0)]))),
                ("Count", PdfObject::Integer(1)),
            ]),
        )
        .unwrap();
    writer
        .write_object(
            3,
            0,
            &dict(vec![
                ("Type", name("Page")),
                ("Parent", PdfObject::Reference(2, 0)),
                ("MediaBox", rect([0, 0, 612, 792])),
                ("Contents", PdfObject::Reference(4, 0)),
            ]),
        )
        .unwrap();
    writer
        .write_object(
            4,
            0,
            &PdfObject::Stream(PdfStream {
                dict: PdfDictionary::new(),
                data: b"BT /F1 12 Tf (Hello) Tj ET".to_vec(),
            }),
        )
        .unwrap();

    let mut trailer = PdfDictionary::new();
    trailer.insert("Root", PdfObject::Reference(1, 0));
    writer.finish(trailer).unwrap()
}

#[test]
fn test_single_page_document_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.pdf");
    std::fs::write(&path, single_page_document()).unwrap();

    let document = PdfDocument::open(&path).unwrap();
    assert_eq!(document.num_pages().unwrap(), 1);

    let page = document.get_page(1).unwrap();
    assert_eq!(page.width(), 612.0);
    assert_eq!(page.height(), 792.0);
    assert_eq!(page.crop_box, page.media_box);
    assert_eq!(page.rotation, 0);

    assert_eq!(
        document.page_content(1).unwrap(),
        b"BT /F1 12 Tf (Hello) Tj ET".to_vec()
    );
}

#[test]
fn test_writer_output_resolves_every_object() {
    let document = PdfDocument::from_bytes(single_page_document()).unwrap();
    let xref = document.xref().unwrap();
    assert_eq!(xref.size(), Some(5));

    for obj_num in 1..=4 {
        assert!(!document.get_object(obj_num).unwrap().is_null());
    }
    assert!(matches!(xref.get_entry(0), Some(XRefEntry::Free { .. })));
}

#[test]
fn test_get_object_twice_is_a_cache_hit() {
    let document = PdfDocument::from_bytes(single_page_document()).unwrap();
    let first = document.get_object(4).unwrap();
    let cached = document.resources().get_cached(4);
    let second = document.get_object(4).unwrap();
    assert_eq!(first, second);
    assert_eq!(cached, Some(first));
}

#[test]
fn test_incremental_update_newest_definition_wins() {
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] >>");
    pdf.object(5, b"(original)");
    pdf.object(6, b"<< /Title (Draft) >>");
    let base = pdf.xref_section(&[1, 2, 3, 5, 6], "/Size 7 /Root 1 0 R /Info 6 0 R");

    pdf.object(5, b"(revised)");
    pdf.xref_section(&[5], &format!("/Size 7 /Root 1 0 R /Prev {base}"));

    let document = PdfDocument::from_bytes(pdf.data).unwrap();
    let revised = document.get_object(5).unwrap();
    assert_eq!(revised, PdfObject::String(PdfString::new(b"revised".to_vec())));

    // Keys only in the older trailer are still merged in
    assert_eq!(document.metadata().unwrap().title.as_deref(), Some("Draft"));
    assert_eq!(document.xref().unwrap().sections().len(), 2);
}

#[test]
fn test_circular_prev_chain_is_rejected() {
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, b"<< /Type /Pages /Kids [] /Count 0 >>");
    let start = pdf.data.len();
    pdf.xref_section(&[1, 2], &format!("/Size 3 /Root 1 0 R /Prev {start}"));

    assert!(matches!(
        PdfDocument::from_bytes(pdf.data),
        Err(ParseError::CircularXRef(offset)) if offset == start as u64
    ));
}

/// Objects 10, 11 and 12 live in object stream 20; the cross-reference
/// stream is object 21.
fn compressed_objects_document() -> Vec<u8> {
    let mut pdf = RawPdf::new("1.5");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, b"<< /Type /Page /Parent 2 0 R /MediaBox 12 0 R >>");

    let mut payload = format!("{:<20}", "10 0 11 5 12 11").into_bytes();
    payload.extend_from_slice(b"(a)  /Foo  [0 0 300 400]");
    pdf.stream(
        20,
        "/Type /ObjStm /N 3 /First 20 /Filter /FlateDecode",
        &zlib(&payload),
    );

    let xref_offset = pdf.data.len();
    let mut records = Vec::new();
    for number in 0u32..22 {
        let (kind, field1, field2): (u8, u32, u16) = match number {
            10..=12 => (2, 20, (number - 10) as u16),
            21 => (1, xref_offset as u32, 0),
            n => match pdf.offsets.get(&n) {
                Some(&offset) => (1, offset as u32, 0),
                None => (0, 0, if n == 0 { 0xFFFF } else { 0 }),
            },
        };
        records.push(kind);
        records.extend_from_slice(&field1.to_be_bytes());
        records.extend_from_slice(&field2.to_be_bytes());
    }
    pdf.stream(21, "/Type /XRef /Size 22 /W [1 4 2] /Root 1 0 R", &records);
    pdf.data
        .extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
    pdf.data
}

#[test]
fn test_compressed_object_resolution() {
    let document = PdfDocument::from_bytes(compressed_objects_document()).unwrap();

    assert_eq!(document.get_object(11).unwrap(), name("Foo"));
    assert_eq!(
        document.get_object(10).unwrap(),
        PdfObject::String(PdfString::new(b"a".to_vec()))
    );
    assert!(matches!(
        document.xref().unwrap().get_entry(11),
        Some(XRefEntry::Compressed { stream_obj_num: 20, index: 1 })
    ));

    // The page's MediaBox is itself a compressed object
    let page = document.get_page(1).unwrap();
    assert_eq!((page.width(), page.height()), (300.0, 400.0));
}

#[test]
fn test_inherited_attributes_and_rotation() {
    let mut pdf = RawPdf::new("1.7");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(
        2,
        b"<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 3 /MediaBox [0 0 612 792] /Rotate 90 /Resources << /Font << /F1 7 0 R >> >> >>",
    );
    pdf.object(3, b"<< /Type /Page /Parent 2 0 R /Rotate 0 /CropBox [10 10 600 780] >>");
    pdf.object(4, b"<< /Type /Pages /Parent 2 0 R /Kids [5 0 R 6 0 R] /Count 2 /MediaBox [0 0 100 50] >>");
    pdf.object(5, b"<< /Type /Page /Parent 4 0 R /Resources << >> >>");
    // A dangling kid is skipped
    pdf.object(6, b"(not a page)");
    pdf.object(7, b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    pdf.xref_section(&[1, 2, 3, 4, 5, 6, 7], "/Size 8 /Root 1 0 R");

    let document = PdfDocument::from_bytes(pdf.data).unwrap();
    assert_eq!(document.num_pages().unwrap(), 2);

    let first = document.get_page(1).unwrap();
    assert_eq!(first.obj_ref, (3, 0));
    assert_eq!(first.rotation, 0);
    assert_eq!(first.width(), 612.0);
    assert_eq!(first.crop_box.as_array(), [10.0, 10.0, 600.0, 780.0]);
    let fonts = first.get_resources().and_then(|r| r.get("Font"));
    assert!(fonts.is_some());

    let second = document.get_page(2).unwrap();
    assert_eq!(second.number, 2);
    assert_eq!(second.rotation, 90);
    assert_eq!((second.width(), second.height()), (50.0, 100.0));
    // The page's own empty Resources replaces the inherited one
    assert_eq!(second.get_resources().map(|r| r.len()), Some(0));
}

#[test]
fn test_flate_png_predictor_stream() {
    // Up then Sub rows, Columns 3
    let rows = [0u8, 10, 10, 10, 2, 5, 0, 0, 1, 5, 0, 0];
    let mut pdf = RawPdf::new("1.5");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, b"<< /Type /Pages /Kids [] /Count 0 >>");
    pdf.stream(
        3,
        "/Filter /FlateDecode /DecodeParms << /Predictor 15 /Columns 3 /Colors 1 /BitsPerComponent 8 >>",
        &zlib(&rows),
    );
    pdf.xref_section(&[1, 2, 3], "/Size 4 /Root 1 0 R");

    let document = PdfDocument::from_bytes(pdf.data).unwrap();
    assert_eq!(document.num_pages().unwrap(), 0);

    let stream = document.get_object(3).unwrap();
    let decoded = document.decode_stream(stream.as_stream().unwrap()).unwrap();
    assert_eq!(decoded, vec![10, 10, 10, 15, 10, 10, 5, 5, 5]);
}

#[test]
fn test_encrypted_document_is_rejected() {
    let mut pdf = RawPdf::new("1.6");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, b"<< /Type /Pages /Kids [] /Count 0 >>");
    pdf.object(3, b"<< /Filter /Standard /V 2 /R 3 >>");
    pdf.xref_section(&[1, 2, 3], "/Size 4 /Root 1 0 R /Encrypt 3 0 R");

    assert!(matches!(
        PdfDocument::from_bytes(pdf.data),
        Err(ParseError::EncryptionNotSupported)
    ));
}

#[test]
fn test_corrupt_object_is_local_error() {
    let mut pdf = RawPdf::new("1.4");
    pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, b"<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>");
    pdf.object(3, b"<< /Type /Page /MediaBox [0 0 10 10] >>");
    pdf.object(4, b"<< /Type /Page /MediaBox [0 0 10 10]");
    pdf.xref_section(&[1, 2, 3, 4], "/Size 5 /Root 1 0 R");

    let document = PdfDocument::from_bytes(pdf.data).unwrap();
    assert_eq!(document.num_pages().unwrap(), 1);
    assert!(document.get_object(4).is_err());
    assert!(document.get_object(3).is_ok());
}

#[test]
fn test_strict_mode_rejects_leading_junk() {
    let mut data = b"garbage\n".to_vec();
    data.extend_from_slice(&single_page_document());

    assert!(PdfDocument::from_bytes_with_options(data.clone(), ParseOptions::strict()).is_err());

    // The writer's offsets count from %PDF-, so lenient mode rebases them
    let document = PdfDocument::from_bytes(data).unwrap();
    assert_eq!(document.num_pages().unwrap(), 1);
    assert_eq!(document.get_page(1).unwrap().width(), 612.0);
}

#[test]
fn test_close_releases_document() {
    let mut document = PdfDocument::from_bytes(single_page_document()).unwrap();
    assert!(!document.is_closed());
    document.close();
    assert!(matches!(document.get_object(1), Err(ParseError::DocumentClosed)));
    assert!(matches!(document.get_page(1), Err(ParseError::DocumentClosed)));
    assert!(matches!(
        document.resolve_object(&PdfObject::Reference(1, 0)),
        Err(ParseError::DocumentClosed)
    ));
    document.close();
}
