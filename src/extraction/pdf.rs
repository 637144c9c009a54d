//! PDF → Markdown extraction.
//!
//! `pdf-extract` gives reliable per-page reading-order text; `lopdf` (already
//! a dependency for the Validator's page-count check) is reused here to pull
//! the title from the document's Info dictionary. Headings are a heuristic —
//! a short line with no trailing sentence punctuation is promoted to a
//! Markdown `#` line — since PDF content streams carry no font-weight
//! metadata once flattened to plain text.

use crate::error::RagError;
use lopdf::Object;

pub fn extract(bytes: &[u8]) -> Result<String, RagError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagError::Internal(anyhow::anyhow!("pdf-extract failed: {e}")))?;

    let title = lopdf::Document::load_mem(bytes)
        .ok()
        .and_then(|doc| extract_title(&doc));

    let mut out = String::new();
    if let Some(t) = title {
        out.push_str(&format!("# {t}\n\n"));
    }

    for (i, page_text) in pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("\n\n## Page {}\n\n", i + 1));
        }
        out.push_str(&markdownize_page(page_text));
    }

    Ok(out)
}

fn extract_title(doc: &lopdf::Document) -> Option<String> {
    let info_obj = doc.trailer.get(b"Info").ok().and_then(|info_ref| match info_ref {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    })?;
    let dict = info_obj.as_dict().ok()?;
    let title_obj = dict.get(b"Title").ok()?;
    let bytes = title_obj.as_str().ok()?;
    let title = String::from_utf8_lossy(bytes).trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Collapse a raw page of extracted text into Markdown-flavoured paragraphs,
/// promoting short standalone lines to headings and lines beginning with a
/// bullet glyph to a Markdown list item.
fn markdownize_page(raw: &str) -> String {
    let mut lines_out = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines_out.push(String::new());
            continue;
        }
        if looks_like_heading(trimmed) {
            lines_out.push(format!("### {trimmed}"));
        } else if let Some(item) = trimmed
            .strip_prefix('•')
            .or_else(|| trimmed.strip_prefix('-'))
            .or_else(|| trimmed.strip_prefix('*'))
        {
            lines_out.push(format!("- {}", item.trim()));
        } else {
            lines_out.push(trimmed.to_string());
        }
    }
    lines_out.join("\n")
}

fn looks_like_heading(line: &str) -> bool {
    let char_count = line.chars().count();
    char_count > 0
        && char_count <= 80
        && !line.ends_with('.')
        && !line.ends_with(',')
        && line.chars().filter(|c| c.is_alphabetic()).count() > 0
        && line
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_heuristic_rejects_long_sentences() {
        let sentence = "This is a normal sentence that ends with a period.";
        assert!(!looks_like_heading(sentence));
    }

    #[test]
    fn heading_heuristic_accepts_short_title_case_line() {
        assert!(looks_like_heading("Executive Summary"));
    }

    #[test]
    fn markdownize_converts_bullets() {
        let page = "• first item\n• second item";
        let md = markdownize_page(page);
        assert_eq!(md, "- first item\n- second item");
    }
}
