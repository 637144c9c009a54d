//! Shared data model: `Document`, `Chunk`, `LexicalIndex`, and the structured
//! sections produced by the Text Extractor for format-aware chunking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// Keys the system owns; a caller-supplied `user_metadata` map containing any
/// of these is rejected wholesale at ingest (`RagError::ProtectedMetadataKey`).
pub const PROTECTED_METADATA_KEYS: &[&str] = &[
    "uploaded_by",
    "uploaded_at",
    "uploaded_via",
    "filename",
    "file_type",
    "file_size",
    "content_hash",
    "chunk_count",
    "doc_id",
    "doc_uuid",
    "created_at",
    "updated_at",
    "deleted_at",
    "version",
    "original_filename",
];

/// One logical ingested artefact. The relational row; chunk bodies and the
/// lexical index live in the blob store under `uuid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub uuid: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub chunk_count: i32,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_via: String,
    pub user_metadata: HashMap<String, JsonValue>,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub token_count: Option<i32>,
}

/// One embedding-bearing segment. The embedding vector and index live in the
/// relational store; the text body lives in the blob store at
/// `{document.uuid}/chunks/{chunk_index:03d}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub embedding: Vec<f32>,
    pub start_char: Option<i32>,
    pub end_char: Option<i32>,
}

/// Chunk body as persisted in the blob store: `{uuid}/chunks/{NNN}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkBody {
    pub text: String,
    pub index: usize,
    pub metadata: ChunkBodyMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkBodyMetadata {
    pub start_char: usize,
    pub end_char: usize,
}

/// Per-document term-frequency aggregate. No global IDF table exists; the
/// wire format is exactly `{"term_frequencies": {"<stem>": <int>, ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LexicalIndex {
    pub term_frequencies: HashMap<String, u32>,
}

/// Structured section extracted from a document (PDF form, table, page of
/// narrative text). Lets the Chunker keep related data atomic instead of
/// blindly sliding a window over a flattened document.
#[derive(Debug, Clone)]
pub enum DocumentSection {
    Text {
        content: String,
        page: usize,
        heading: Option<String>,
    },
    FormFields {
        fields: Vec<(String, String)>,
        page: usize,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        page: usize,
        caption: Option<String>,
    },
}

/// Format tag assigned by the Validator and consumed by the Text Extractor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FormatTag {
    Pdf,
    Json,
    Xml,
    Yaml,
    Text,
}

impl FormatTag {
    /// Resolve a format tag from a filename extension. Returns `None` for an
    /// extension outside the Validator's whitelist.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            "yaml" | "yml" => Some(Self::Yaml),
            "txt" | "md" | "markdown" | "rst" | "log" | "csv" | "toml" | "ini" | "py" | "js"
            | "html" | "htm" | "css" => Some(Self::Text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_keys_cover_system_columns() {
        assert!(PROTECTED_METADATA_KEYS.contains(&"uploaded_by"));
        assert!(PROTECTED_METADATA_KEYS.contains(&"original_filename"));
        assert!(!PROTECTED_METADATA_KEYS.contains(&"department"));
    }

    #[test]
    fn format_tag_resolves_whitelisted_extensions() {
        assert_eq!(FormatTag::from_extension("pdf"), Some(FormatTag::Pdf));
        assert_eq!(FormatTag::from_extension("YML"), Some(FormatTag::Yaml));
        assert_eq!(FormatTag::from_extension("exe"), None);
    }
}
