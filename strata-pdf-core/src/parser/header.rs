//! PDF Header Parser
//!
//! Parses PDF header and version according to ISO 32000-1 Section 7.5.2

use super::{ParseError, ParseResult};

const HEADER_PREFIX: &[u8] = b"%PDF-";

/// How far into the file a non-strict reader looks for `%PDF-`
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    /// Create a new PDF version
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version is supported
    pub fn is_supported(&self) -> bool {
        // We support PDF 1.0 through 2.0
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    pub has_binary_marker: bool,
    /// Byte offset of `%PDF-`; non-zero when junk precedes the header
    pub offset: usize,
}

impl PdfHeader {
    /// Parse the header at the start of `data`.
    ///
    /// In strict mode `%PDF-` must be the first bytes of the file; otherwise it
    /// may appear anywhere within the first kilobyte.
    pub fn parse(data: &[u8], strict: bool) -> ParseResult<Self> {
        if data.is_empty() {
            return Err(ParseError::EmptyFile);
        }

        let offset = if strict {
            if !data.starts_with(HEADER_PREFIX) {
                return Err(ParseError::InvalidHeader);
            }
            0
        } else {
            let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
            window
                .windows(HEADER_PREFIX.len())
                .position(|w| w == HEADER_PREFIX)
                .ok_or(ParseError::InvalidHeader)?
        };

        if offset > 0 {
            tracing::warn!(offset, "PDF header does not start at byte 0");
        }

        let rest = &data[offset + HEADER_PREFIX.len()..];
        let line_end = rest
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(rest.len());
        if line_end > 100 {
            return Err(ParseError::InvalidHeader);
        }

        let version = Self::parse_version(&rest[..line_end])?;
        if !version.is_supported() {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }

        let has_binary_marker = Self::check_binary_marker(&rest[line_end..]);

        Ok(PdfHeader {
            version,
            has_binary_marker,
            offset,
        })
    }

    /// Parse `M.m`, ignoring trailing whitespace
    fn parse_version(line: &[u8]) -> ParseResult<PdfVersion> {
        let text = String::from_utf8_lossy(line);
        let (major, minor) = text
            .trim()
            .split_once('.')
            .ok_or(ParseError::InvalidHeader)?;

        let major = major.parse::<u8>().map_err(|_| ParseError::InvalidHeader)?;
        let minor = minor.parse::<u8>().map_err(|_| ParseError::InvalidHeader)?;

        Ok(PdfVersion::new(major, minor))
    }

    /// Binary marker: a comment line right after the header holding at least four bytes >= 128
    fn check_binary_marker(after_header: &[u8]) -> bool {
        let start = after_header
            .iter()
            .position(|&b| b != b'\n' && b != b'\r')
            .unwrap_or(after_header.len());
        let line = &after_header[start..];
        let end = line
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(line.len())
            .min(1024);

        match line[..end].split_first() {
            Some((b'%', marker)) => marker.iter().filter(|&&b| b >= 128).count() >= 4,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pdf_header_basic() {
        let header = PdfHeader::parse(b"%PDF-1.7\n", true).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 7));
        assert!(!header.has_binary_marker);
        assert_eq!(header.offset, 0);
    }

    #[test]
    fn test_parse_pdf_header_with_binary_marker() {
        let header = PdfHeader::parse(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n1 0 obj", false).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 4));
        assert!(header.has_binary_marker);

        let header = PdfHeader::parse(b"%PDF-1.4\r\n%\xE2\xE3\xCF\xD3\r\n", false).unwrap();
        assert!(header.has_binary_marker);
    }

    #[test]
    fn test_parse_pdf_20() {
        let header = PdfHeader::parse(b"%PDF-2.0\r", true).unwrap();
        assert_eq!(header.version.to_string(), "2.0");
    }

    #[test]
    fn test_unsupported_versions() {
        assert!(matches!(
            PdfHeader::parse(b"%PDF-1.8\n", false),
            Err(ParseError::UnsupportedVersion(v)) if v == "1.8"
        ));
        assert!(matches!(
            PdfHeader::parse(b"%PDF-3.0\n", false),
            Err(ParseError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_invalid_headers() {
        assert!(matches!(PdfHeader::parse(b"", false), Err(ParseError::EmptyFile)));
        assert!(matches!(
            PdfHeader::parse(b"%PS-Adobe-3.0\n", false),
            Err(ParseError::InvalidHeader)
        ));
        assert!(matches!(
            PdfHeader::parse(b"%PDF-17\n", false),
            Err(ParseError::InvalidHeader)
        ));
        assert!(matches!(
            PdfHeader::parse(b"%PDF-1.x\n", false),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_leading_junk_only_allowed_when_lenient() {
        let data = b"garbage\n%PDF-1.5\n";
        let header = PdfHeader::parse(data, false).unwrap();
        assert_eq!(header.offset, 8);
        assert_eq!(header.version, PdfVersion::new(1, 5));

        assert!(matches!(
            PdfHeader::parse(data, true),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_version_ordering() {
        assert!(PdfVersion::new(1, 4) < PdfVersion::new(1, 7));
        assert!(PdfVersion::new(1, 7) < PdfVersion::new(2, 0));
    }
}
