//! File-type tiered validation (C14).
//!
//! Three tiers selected by filename extension: strict binary formats must
//! match their magic bytes and open with a real parser; structured formats
//! must parse and report a precise diagnostic on failure; everything else
//! only needs to decode as UTF-8.

use crate::error::{ParseDiagnostic, RagError};
use std::path::Path;

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

const STRICT_FORMATS: &[&str] = &["pdf"];
const STRUCTURED_FORMATS: &[&str] = &["json", "xml", "yaml", "yml"];
const TEXT_FORMATS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "csv", "toml", "ini", "py", "js", "html", "htm", "css",
];

/// Output of validation: the resolved format tag plus the raw bytes. The
/// Text Extractor re-derives structure from `bytes` rather than taking a
/// pre-parsed tree, so structured-format validation here is parse-and-discard
/// (its only job is to fail fast with a diagnostic).
#[derive(Debug)]
pub struct ValidationOutput {
    pub format_tag: crate::types::FormatTag,
    pub bytes: Vec<u8>,
}

pub struct Validator;

impl Validator {
    /// Validate `content` against the tier implied by `filename`'s extension.
    pub fn validate(filename: &str, content: &[u8]) -> Result<ValidationOutput, RagError> {
        if content.len() as u64 > MAX_FILE_SIZE {
            return Err(RagError::TooLarge {
                filename: filename.to_string(),
                limit_bytes: MAX_FILE_SIZE,
            });
        }

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if ext.is_empty() {
            return Err(RagError::Validation {
                filename: filename.to_string(),
                claimed: "(none)".to_string(),
                detected: "(unknown)".to_string(),
                hint: "add a file extension such as .pdf, .txt, or .json".to_string(),
            });
        }

        if STRICT_FORMATS.contains(&ext.as_str()) {
            Self::validate_strict(&ext, content, filename)
        } else if STRUCTURED_FORMATS.contains(&ext.as_str()) {
            Self::validate_structured(&ext, content, filename)
        } else if TEXT_FORMATS.contains(&ext.as_str()) {
            Self::validate_text(content, filename)
        } else {
            Err(RagError::Validation {
                filename: filename.to_string(),
                claimed: ext,
                detected: "(unsupported extension)".to_string(),
                hint: format!(
                    "supported extensions: {}",
                    STRICT_FORMATS
                        .iter()
                        .chain(STRUCTURED_FORMATS)
                        .chain(TEXT_FORMATS)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        }
    }

    fn validate_strict(
        ext: &str,
        content: &[u8],
        filename: &str,
    ) -> Result<ValidationOutput, RagError> {
        let detected = detect_mime(content);
        let expected = "application/pdf";

        if detected != expected {
            return Err(RagError::Validation {
                filename: filename.to_string(),
                claimed: format!("{ext} ({expected})"),
                detected,
                hint: format!(
                    "rename to the correct extension, or convert the file to {} format",
                    ext.to_uppercase()
                ),
            });
        }

        let page_count = lopdf::Document::load_mem(content)
            .map(|doc| doc.get_pages().len())
            .map_err(|e| RagError::Validation {
                filename: filename.to_string(),
                claimed: ext.to_string(),
                detected: detected.clone(),
                hint: format!("corrupted PDF, re-save from the original source: {e}"),
            })?;

        if page_count == 0 {
            return Err(RagError::Validation {
                filename: filename.to_string(),
                claimed: ext.to_string(),
                detected,
                hint: "PDF has zero pages; cannot extract text from an empty document".to_string(),
            });
        }

        Ok(ValidationOutput {
            format_tag: crate::types::FormatTag::Pdf,
            bytes: content.to_vec(),
        })
    }

    fn validate_structured(
        ext: &str,
        content: &[u8],
        filename: &str,
    ) -> Result<ValidationOutput, RagError> {
        let text = std::str::from_utf8(content).map_err(|e| RagError::Validation {
            filename: filename.to_string(),
            claimed: ext.to_string(),
            detected: "(non-UTF-8 bytes)".to_string(),
            hint: format!("file is not valid UTF-8: {e}"),
        })?;

        let (format_tag, result) = match ext {
            "json" => (
                crate::types::FormatTag::Json,
                serde_json::from_str::<serde_json::Value>(text)
                    .map(|_| ())
                    .map_err(|e| ParseDiagnostic {
                        line: e.line(),
                        column: e.column(),
                        snippet: snippet_around(text, e.line()),
                    }),
            ),
            "xml" => (
                crate::types::FormatTag::Xml,
                validate_xml(text).map_err(|msg| ParseDiagnostic {
                    line: 0,
                    column: 0,
                    snippet: msg,
                }),
            ),
            "yaml" | "yml" => (
                crate::types::FormatTag::Yaml,
                serde_yaml::from_str::<serde_yaml::Value>(text)
                    .map(|_| ())
                    .map_err(|e| ParseDiagnostic {
                        line: e.location().map(|l| l.line()).unwrap_or(0),
                        column: e.location().map(|l| l.column()).unwrap_or(0),
                        snippet: e.to_string().chars().take(300).collect(),
                    }),
            ),
            _ => unreachable!("caller already filtered to STRUCTURED_FORMATS"),
        };

        result.map_err(|diagnostic| RagError::StructuredParse {
            filename: filename.to_string(),
            diagnostic,
        })?;

        Ok(ValidationOutput {
            format_tag,
            bytes: content.to_vec(),
        })
    }

    fn validate_text(content: &[u8], filename: &str) -> Result<ValidationOutput, RagError> {
        std::str::from_utf8(content).map_err(|e| RagError::Validation {
            filename: filename.to_string(),
            claimed: "text".to_string(),
            detected: "(non-UTF-8 bytes)".to_string(),
            hint: format!("convert the file to UTF-8 encoding: {e}"),
        })?;

        Ok(ValidationOutput {
            format_tag: crate::types::FormatTag::Text,
            bytes: content.to_vec(),
        })
    }
}

fn validate_xml(text: &str) -> Result<(), String> {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Eof) => return Ok(()),
            Ok(_) => buf.clear(),
            Err(e) => return Err(format!("{e}")),
        }
    }
}

fn snippet_around(text: &str, line: usize) -> String {
    text.lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .take(200)
        .collect()
}

/// First-2KiB magic byte sniffing. We only need to distinguish PDF from
/// anything else — the strict tier is PDF-only — so a minimal signature
/// check stands in for a full magic-number database.
fn detect_mime(content: &[u8]) -> String {
    let head = &content[..content.len().min(2048)];
    if head.starts_with(b"%PDF-") {
        "application/pdf".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_file() {
        let big = vec![0u8; (MAX_FILE_SIZE + 1) as usize];
        let err = Validator::validate("big.txt", &big).unwrap_err();
        assert!(matches!(err, RagError::TooLarge { .. }));
    }

    #[test]
    fn rejects_missing_extension() {
        let err = Validator::validate("noext", b"hello").unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn rejects_unsupported_extension() {
        let err = Validator::validate("payload.exe", b"hello").unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn accepts_plain_text() {
        let out = Validator::validate("notes.txt", "hello world".as_bytes()).unwrap();
        assert_eq!(out.format_tag, crate::types::FormatTag::Text);
    }

    #[test]
    fn rejects_non_utf8_text() {
        let err = Validator::validate("notes.txt", &[0xFF, 0xFE, 0x00, 0x80]).unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn accepts_valid_json() {
        let out = Validator::validate("data.json", br#"{"a": 1}"#).unwrap();
        assert_eq!(out.format_tag, crate::types::FormatTag::Json);
    }

    #[test]
    fn rejects_invalid_json_with_location() {
        let err = Validator::validate("data.json", b"{\"a\": }").unwrap_err();
        match err {
            RagError::StructuredParse { diagnostic, .. } => assert!(diagnostic.line >= 1),
            other => panic!("expected StructuredParse, got {other:?}"),
        }
    }

    #[test]
    fn rejects_pdf_with_wrong_magic_bytes() {
        let err = Validator::validate("fake.pdf", b"not really a pdf").unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }
}
