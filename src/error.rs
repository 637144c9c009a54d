//! Crate-wide error taxonomy.
//!
//! Every orchestrator-facing operation returns `Result<T, RagError>`. Internal,
//! call-chain-local helpers may still return `anyhow::Result` the way the
//! upstream LLM client code does; public APIs on the stores and orchestrators
//! do not.

use thiserror::Error;

/// Structured diagnostic for a parse failure in a structured document
/// (JSON/XML/YAML). Carries enough context to point a user at the exact
/// offending location without re-parsing client-side.
#[derive(Debug, Clone)]
pub struct ParseDiagnostic {
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}, column {}: ...{}...",
            self.line, self.column, self.snippet
        )
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error(
        "validation failed for '{filename}': extension claims {claimed}, detected {detected}. {hint}"
    )]
    Validation {
        filename: String,
        claimed: String,
        detected: String,
        hint: String,
    },

    #[error("structured parse failure in '{filename}': {diagnostic}")]
    StructuredParse {
        filename: String,
        diagnostic: ParseDiagnostic,
    },

    #[error("file '{filename}' exceeds the size ceiling of {limit_bytes} bytes")]
    TooLarge { filename: String, limit_bytes: u64 },

    #[error("upload rejected: protected metadata keys present: {0:?}")]
    ProtectedMetadataKey(Vec<String>),

    /// Part of the taxonomy for completeness; the ingestion orchestrator
    /// resolves a duplicate upload locally (returns the existing document
    /// instead of raising) rather than propagating this variant.
    #[error("document already exists with content_hash {0}")]
    DuplicateHash(String),

    #[error("extracted text is empty for '{0}'")]
    TextExtractionEmpty(String),

    #[error("embedding provider rejected input as too large after exhausting split depth")]
    EmbeddingOverflow,

    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("LLM summary/keyword extraction failed: {0}")]
    LlmExtractionFailure(String),

    #[error("blob write failed for {uuid}: {source}")]
    BlobWriteFailure {
        uuid: String,
        #[source]
        source: object_store::Error,
    },

    #[error("blob read failed for {key}: {source}")]
    BlobReadFailure {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("filter parse error: {0}")]
    FilterParseError(String),

    #[error("reranker unavailable: {0}")]
    RerankerUnavailable(String),

    #[error("not authenticated")]
    AuthError,

    #[error("forbidden")]
    Forbidden,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type RagResult<T> = Result<T, RagError>;

impl From<object_store::Error> for RagError {
    fn from(err: object_store::Error) -> Self {
        RagError::BlobReadFailure {
            key: String::new(),
            source: err,
        }
    }
}

/// True when the error reflects a recoverable backend hiccup worth retrying
/// (HTTP 429/500/503/504 surfaced by an upstream client, or a transient
/// connection reset). Mirrors the retry predicate the Summary/Keyword
/// Extractor applies before giving up.
pub fn is_retriable_llm_error(status: Option<u16>) -> bool {
    matches!(status, Some(429) | Some(500) | Some(503) | Some(504))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_status_codes() {
        assert!(is_retriable_llm_error(Some(429)));
        assert!(is_retriable_llm_error(Some(503)));
        assert!(!is_retriable_llm_error(Some(400)));
        assert!(!is_retriable_llm_error(None));
    }

    #[test]
    fn protected_metadata_message_lists_offenders() {
        let err = RagError::ProtectedMetadataKey(vec!["uploaded_by".into(), "doc_id".into()]);
        let msg = err.to_string();
        assert!(msg.contains("uploaded_by"));
        assert!(msg.contains("doc_id"));
    }
}
