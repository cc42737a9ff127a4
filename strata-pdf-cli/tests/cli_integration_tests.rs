//! Integration tests for the stratapdf CLI
//!
//! Each test writes a small document with `PdfWriter` into a temp directory
//! and runs the compiled binary against it.

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::process::Command;
use strata_pdf::parser::{PdfArray, PdfDictionary, PdfName, PdfStream, PdfString};
use strata_pdf::{PdfObject, PdfWriter};
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    if path.ends_with("deps") {
        path.pop(); // Remove "deps" directory
    }
    path.push("stratapdf");
    #[cfg(windows)]
    path.set_extension("exe");
    path
}

fn run_cli_command(args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(get_cli_path()).args(args).output()?;
    Ok(output)
}

fn name(value: &str) -> PdfObject {
    PdfObject::Name(PdfName::new(value))
}

/// Two pages, the second rotated, with document information
fn write_sample_pdf(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sample.pdf");
    let mut writer = PdfWriter::create(&path).unwrap();

    let mut catalog = PdfDictionary::new();
    catalog.insert("Type", name("Catalog"));
    catalog.insert("Pages", PdfObject::Reference(2, 0));
    writer.write_object(1, 0, &PdfObject::Dictionary(catalog)).unwrap();

    let mut pages = PdfDictionary::new();
    pages.insert("Type", name("Pages"));
    pages.insert(
        "Kids",
        PdfObject::Array(PdfArray(vec![
            PdfObject::Reference(3, 0),
            PdfObject::Reference(4, 0),
        ])),
    );
    pages.insert("Count", PdfObject::Integer(2));
    pages.insert(
        "MediaBox",
        PdfObject::Array(PdfArray(vec![
            PdfObject::Integer(0),
            PdfObject::Integer(0),
            PdfObject::Integer(612),
            PdfObject::Integer(792),
        ])),
    );
    writer.write_object(2, 0, &PdfObject::Dictionary(pages)).unwrap();

    let mut first = PdfDictionary::new();
    first.insert("Type", name("Page"));
    first.insert("Parent", PdfObject::Reference(2, 0));
    first.insert("Contents", PdfObject::Reference(5, 0));
    writer.write_object(3, 0, &PdfObject::Dictionary(first)).unwrap();

    let mut second = PdfDictionary::new();
    second.insert("Type", name("Page"));
    second.insert("Parent", PdfObject::Reference(2, 0));
    second.insert("Rotate", PdfObject::Integer(90));
    writer.write_object(4, 0, &PdfObject::Dictionary(second)).unwrap();

    let mut content_dict = PdfDictionary::new();
    content_dict.insert("Filter", name("ASCIIHexDecode"));
    writer
        .write_object(
            5,
            0,
            &PdfObject::Stream(PdfStream {
                dict: content_dict,
                data: b"48656C6C6F>".to_vec(),
            }),
        )
        .unwrap();

    let mut info = PdfDictionary::new();
    info.insert("Title", PdfObject::String(PdfString::new(b"Quarterly Report".to_vec())));
    info.insert("Producer", PdfObject::String(PdfString::new(b"strata".to_vec())));
    writer.write_object(6, 0, &PdfObject::Dictionary(info)).unwrap();

    let mut trailer = PdfDictionary::new();
    trailer.insert("Root", PdfObject::Reference(1, 0));
    trailer.insert("Info", PdfObject::Reference(6, 0));
    writer.finish(trailer).unwrap();

    path
}

fn stdout_of(args: &[&str]) -> String {
    let output = run_cli_command(args).expect("CLI should run");
    assert!(
        output.status.success(),
        "command {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_info_command() {
    let dir = tempdir().unwrap();
    let path = write_sample_pdf(&dir);

    let stdout = stdout_of(&["info", arg(&path)]);
    assert!(stdout.contains("PDF Version: 1.7"), "{stdout}");
    assert!(stdout.contains("Pages: 2"));
    assert!(stdout.contains("Title: Quarterly Report"));
    assert!(stdout.contains("Producer: strata"));
    assert!(stdout.contains("Objects: 7"));
}

#[test]
fn test_cli_pages_command() {
    let dir = tempdir().unwrap();
    let path = write_sample_pdf(&dir);

    let stdout = stdout_of(&["pages", arg(&path)]);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Page 1: 612 x 792 pt, rotation 0, object 3 0",
            "Page 2: 792 x 612 pt, rotation 90, object 4 0",
        ]
    );
}

#[test]
fn test_cli_object_command() {
    let dir = tempdir().unwrap();
    let path = write_sample_pdf(&dir);

    let stdout = stdout_of(&["object", arg(&path), "4"]);
    assert!(stdout.contains("/Rotate 90"), "{stdout}");
    assert!(stdout.contains("/Type /Page"));

    let stdout = stdout_of(&["object", arg(&path), "5"]);
    assert!(stdout.contains("stream (11 bytes)"), "{stdout}");

    // Unused numbers print null
    let stdout = stdout_of(&["object", arg(&path), "99"]);
    assert_eq!(stdout.trim(), "null");
}

#[test]
fn test_cli_stream_command() {
    let dir = tempdir().unwrap();
    let path = write_sample_pdf(&dir);

    let stdout = stdout_of(&["stream", arg(&path), "5"]);
    assert_eq!(stdout, "Hello");

    let out_path = dir.path().join("content.bin");
    stdout_of(&["stream", arg(&path), "5", "-o", arg(&out_path)]);
    assert_eq!(std::fs::read(&out_path).unwrap(), b"Hello");
}

#[test]
fn test_cli_stream_rejects_non_stream() {
    let dir = tempdir().unwrap();
    let path = write_sample_pdf(&dir);

    let output = run_cli_command(&["stream", arg(&path), "3"]).unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a stream"));
}

#[test]
fn test_cli_missing_file() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.pdf");

    let output = run_cli_command(&["info", arg(&missing)]).unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to open"));
}

#[test]
fn test_cli_verbose_logs_to_stderr() {
    let dir = tempdir().unwrap();
    let path = write_sample_pdf(&dir);

    let output = Command::new(get_cli_path())
        .args(["-v", "pages", arg(&path)])
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(!output.stderr.is_empty());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Page 1:"));
}
