//! Document ingestion
//!
//! Uploaded documents are reduced to plain requirement text before a
//! session is created. Only the extraction interface lives here, the
//! daemon never looks inside a document anywhere else.

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("document '{0}' contained no text")]
    Empty(String),
}

/// Extracts requirement text from an uploaded document
pub trait DocumentParser: Send + Sync {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<String, IngestError>;
}

impl std::fmt::Debug for dyn DocumentParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DocumentParser")
    }
}

/// Parser for plain-text uploads
///
/// Non-UTF-8 bytes are converted lossily rather than rejected, the
/// replacement characters surface in the requirement where the user
/// can see them.
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<String, IngestError> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                warn!(filename, "PlainTextParser::parse: invalid utf-8, converting lossily");
                String::from_utf8_lossy(bytes).into_owned()
            }
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(IngestError::Empty(filename.to_string()));
        }
        Ok(text)
    }
}

/// Pick a parser for an uploaded filename
///
/// Only plain-text documents are understood. Extensionless files are
/// treated as plain text.
pub fn parser_for(filename: &str) -> Result<Box<dyn DocumentParser>, IngestError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        None | Some("txt" | "md" | "text") => Ok(Box::new(PlainTextParser)),
        Some(other) => Err(IngestError::Unsupported(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utf8_text() {
        let parser = PlainTextParser;
        let text = parser
            .parse("  User login flow with MFA\n".as_bytes(), "reqs.txt")
            .unwrap();
        assert_eq!(text, "User login flow with MFA");
    }

    #[test]
    fn test_parse_recovers_from_invalid_utf8() {
        let parser = PlainTextParser;
        let bytes = [b'f', b'l', b'o', b'w', 0xFF, b'!'];
        let text = parser.parse(&bytes, "broken.txt").unwrap();
        assert_eq!(text, "flow\u{FFFD}!");
    }

    #[test]
    fn test_parse_rejects_documents_without_text() {
        let parser = PlainTextParser;
        let err = parser.parse(b"   \n\t  ", "blank.txt").unwrap_err();
        assert!(matches!(err, IngestError::Empty(name) if name == "blank.txt"));
    }

    #[test]
    fn test_parser_works_as_a_trait_object() {
        let parser: Box<dyn DocumentParser> = Box::new(PlainTextParser);
        assert_eq!(parser.parse(b"hello", "a.txt").unwrap(), "hello");
    }

    #[test]
    fn test_parser_dispatch_by_extension() {
        assert!(parser_for("reqs.txt").is_ok());
        assert!(parser_for("README.md").is_ok());
        assert!(parser_for("notes.TXT").is_ok());
        assert!(parser_for("requirement").is_ok());

        let err = parser_for("slides.pdf").unwrap_err();
        assert!(matches!(err, IngestError::Unsupported(ext) if ext == "pdf"));
    }
}
