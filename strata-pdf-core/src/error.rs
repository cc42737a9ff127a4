use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid object reference: {0} {1} R")]
    InvalidObjectReference(u32, u16),
}

pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_pdf_error_display() {
        let error = PdfError::InvalidStructure("test message".to_string());
        assert_eq!(error.to_string(), "Invalid PDF structure: test message");

        let error = PdfError::InvalidObjectReference(4, 1);
        assert_eq!(error.to_string(), "Invalid object reference: 4 1 R");
    }

    #[test]
    fn test_from_conversions() {
        let error: PdfError = IoError::new(ErrorKind::NotFound, "missing.pdf").into();
        assert!(matches!(error, PdfError::Io(_)));

        let error: PdfError = ParseError::EncryptionNotSupported.into();
        assert_eq!(error.to_string(), "Parse error: Encryption not supported");
    }

    #[test]
    fn test_question_mark_propagation() {
        fn open() -> Result<()> {
            let parsed: std::result::Result<(), ParseError> = Err(ParseError::EmptyFile);
            parsed?;
            Ok(())
        }
        assert!(matches!(open(), Err(PdfError::Parse(ParseError::EmptyFile))));
    }
}
