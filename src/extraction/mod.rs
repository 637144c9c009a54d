//! Text Extractor (C1): per-format contract, always producing UTF-8 text.

mod pdf;
mod structured;

use crate::error::RagError;
use crate::types::FormatTag;

pub struct TextExtractor;

impl TextExtractor {
    /// Extract UTF-8 text from validated bytes. Empty or whitespace-only
    /// output is rejected with `TextExtractionEmpty` — ingestion has nothing
    /// to chunk or embed.
    pub fn extract(filename: &str, format_tag: FormatTag, bytes: &[u8]) -> Result<String, RagError> {
        let text = match format_tag {
            FormatTag::Pdf => pdf::extract(bytes)?,
            FormatTag::Json => {
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| RagError::Internal(anyhow::anyhow!("non-UTF-8 JSON: {e}")))?;
                structured::json_to_yaml(s)?
            }
            FormatTag::Xml => {
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| RagError::Internal(anyhow::anyhow!("non-UTF-8 XML: {e}")))?;
                structured::xml_to_yaml(s)?
            }
            FormatTag::Yaml => std::str::from_utf8(bytes)
                .map_err(|e| RagError::Internal(anyhow::anyhow!("non-UTF-8 YAML: {e}")))?
                .to_string(),
            FormatTag::Text => {
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| RagError::Internal(anyhow::anyhow!("non-UTF-8 text: {e}")))?;
                if is_html(filename, s) {
                    htmd::convert(s)
                        .map_err(|e| RagError::Internal(anyhow::anyhow!("html conversion failed: {e}")))?
                } else {
                    s.to_string()
                }
            }
        };

        if text.trim().is_empty() {
            return Err(RagError::TextExtractionEmpty(filename.to_string()));
        }

        Ok(text)
    }
}

fn is_html(filename: &str, _content: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = TextExtractor::extract("notes.txt", FormatTag::Text, b"hello world").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn empty_output_is_rejected() {
        let err = TextExtractor::extract("notes.txt", FormatTag::Text, b"   \n\t").unwrap_err();
        assert!(matches!(err, RagError::TextExtractionEmpty(_)));
    }

    #[test]
    fn html_is_converted_to_markdown() {
        let html = "<h1>Title</h1><p>Body text</p>";
        let text = TextExtractor::extract("page.html", FormatTag::Text, html.as_bytes()).unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("Body text"));
    }

    #[test]
    fn json_is_dumped_as_yaml() {
        let text =
            TextExtractor::extract("data.json", FormatTag::Json, br#"{"a": 1, "b": 2}"#).unwrap();
        assert!(text.contains("a:"));
        assert!(text.contains("b:"));
    }
}
