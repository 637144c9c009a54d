//! Ingestion Orchestrator (C12): the eleven-step upload pipeline. No single
//! database transaction spans the whole sequence — the relational insert,
//! blob upload, and chunk-row insert are separate operations, so a failure
//! partway through is corrected by compensation (deleting what was already
//! written) rather than rolled back atomically.

use crate::blob_store::BlobStore;
use crate::chunking::TextChunker;
use crate::config::RagConfig;
use crate::embedding::EmbeddingEngine;
use crate::error::{RagError, RagResult};
use crate::extraction::TextExtractor;
use crate::lexical::build_lexical_index;
use crate::metadata_store::{InsertDocumentOutcome, MetadataStore};
use crate::summarize::SummaryExtractor;
use crate::types::{ChunkBody, ChunkBodyMetadata, FormatTag, LexicalIndex, PROTECTED_METADATA_KEYS};
use crate::validation::Validator;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct Ingestor {
    metadata_store: Arc<MetadataStore>,
    blob_store: Arc<BlobStore>,
    chunker: TextChunker,
    embedding_engine: Arc<EmbeddingEngine>,
    summary_extractor: Arc<SummaryExtractor>,
}

/// Result of `Ingestor::ingest`. A duplicate upload is a *success*: it
/// returns the existing document's identity with `chunk_count = 0` and
/// `duplicate = true` rather than an error.
pub struct IngestOutcome {
    pub document_id: i64,
    pub document_uuid: Uuid,
    pub content_hash: String,
    pub chunk_count: usize,
    pub splits_performed: u32,
    pub max_split_depth: u32,
    pub duplicate: bool,
}

impl Ingestor {
    pub fn new(
        metadata_store: Arc<MetadataStore>,
        blob_store: Arc<BlobStore>,
        config: &RagConfig,
        embedding_engine: Arc<EmbeddingEngine>,
        summary_extractor: Arc<SummaryExtractor>,
    ) -> Self {
        Self {
            metadata_store,
            blob_store,
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
            embedding_engine,
            summary_extractor,
        }
    }

    #[tracing::instrument(skip(self, bytes, user_metadata), fields(size_bytes = bytes.len()))]
    pub async fn ingest(
        &self,
        filename: &str,
        bytes: &[u8],
        uploaded_by: &str,
        uploaded_via: &str,
        user_metadata: HashMap<String, JsonValue>,
    ) -> RagResult<IngestOutcome> {
        // 1. Read bytes (already in hand), compute content_hash.
        let content_hash = hex_sha256(bytes);

        // 2. Validate, then check for a duplicate upload. A duplicate is
        // idempotent success, not an error: the caller gets the existing
        // document's identity back with chunks_created = 0.
        let validated = Validator::validate(filename, bytes)?;

        if let Some(existing) = self.metadata_store.find_by_hash(&content_hash).await? {
            tracing::info!(document_id = existing.id, %content_hash, "duplicate upload, returning existing document");
            return Ok(IngestOutcome {
                document_id: existing.id,
                document_uuid: existing.uuid,
                content_hash,
                chunk_count: 0,
                splits_performed: 0,
                max_split_depth: 0,
                duplicate: true,
            });
        }

        // 3. Extract to UTF-8 text.
        let extracted_text = TextExtractor::extract(filename, validated.format_tag, bytes)?;
        if extracted_text.trim().is_empty() {
            return Err(RagError::TextExtractionEmpty(filename.to_string()));
        }

        // 4. Chunk.
        let chunk_outputs = self.chunker.chunk(&extracted_text);
        if chunk_outputs.is_empty() {
            return Err(RagError::TextExtractionEmpty(filename.to_string()));
        }

        // 5. Parallel: embed chunks, summarize/extract keywords, build the
        // lexical index. Only embedding failure is fatal; the lexical index
        // build can't fail and the summary extractor degrades to empty on
        // its own rather than propagating an error.
        let chunk_texts: Vec<String> = chunk_outputs.iter().map(|c| c.text.clone()).collect();
        let (embed_result, extraction_result) = tokio::join!(
            self.embedding_engine.embed_all(&chunk_texts),
            self.summary_extractor.extract(&extracted_text),
        );
        let (embedded_pieces, embedding_stats) = embed_result?;
        let lexical_index: LexicalIndex = build_lexical_index(&extracted_text);

        // 6. Validate user metadata: reject protected keys.
        let offending: Vec<String> = user_metadata
            .keys()
            .filter(|k| PROTECTED_METADATA_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        if !offending.is_empty() {
            return Err(RagError::ProtectedMetadataKey(offending));
        }

        let document_uuid = Uuid::new_v4();
        let mime_type = mime_type_for(validated.format_tag);

        // 7. Insert the document row first so chunk rows have a parent. A
        // concurrent upload of the same content can win the race between
        // our dedup check at step 2 and this insert; the unique constraint
        // on content_hash catches that case and we fall back to the same
        // idempotent-duplicate response rather than surfacing a 500.
        let document_id = match self
            .metadata_store
            .insert_document(
                document_uuid,
                filename,
                mime_type,
                bytes.len() as i64,
                &content_hash,
                uploaded_by,
                uploaded_via,
                &user_metadata,
                &extraction_result.summary,
                &extraction_result.keywords,
                None,
            )
            .await?
        {
            InsertDocumentOutcome::Inserted(id) => id,
            InsertDocumentOutcome::Duplicate(existing) => {
                tracing::info!(document_id = existing.id, %content_hash, "concurrent duplicate upload, returning existing document");
                return Ok(IngestOutcome {
                    document_id: existing.id,
                    document_uuid: existing.uuid,
                    content_hash,
                    chunk_count: 0,
                    splits_performed: 0,
                    max_split_depth: 0,
                    duplicate: true,
                });
            }
        };

        // 8-10. Upload blobs, insert chunk rows, update chunk_count. Any
        // failure from here on triggers compensation.
        if let Err(e) = self
            .upload_and_index(
                document_id,
                document_uuid,
                bytes,
                mime_type,
                &extracted_text,
                &lexical_index,
                &chunk_outputs,
                embedded_pieces,
            )
            .await
        {
            tracing::warn!(document_id, %document_uuid, error = %e, "ingest failed after document row insert, compensating");
            self.compensate(document_id, document_uuid).await;
            return Err(e);
        }

        let chunk_count = chunk_outputs.len() + embedding_stats.splits as usize;
        tracing::info!(document_id, %document_uuid, chunk_count, "ingested document");

        // 11. Return.
        Ok(IngestOutcome {
            document_id,
            document_uuid,
            content_hash,
            chunk_count,
            splits_performed: embedding_stats.splits,
            max_split_depth: embedding_stats.max_depth_reached,
            duplicate: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_and_index(
        &self,
        document_id: i64,
        document_uuid: Uuid,
        original_bytes: &[u8],
        mime_type: &str,
        extracted_text: &str,
        lexical_index: &LexicalIndex,
        chunk_outputs: &[crate::chunking::ChunkOutput],
        embedded_pieces: Vec<Vec<crate::embedding::EmbeddedPiece>>,
    ) -> RagResult<()> {
        // Flatten split-on-overflow pieces back into one ordered chunk list.
        let mut bodies = Vec::new();
        let mut vectors = Vec::new();
        let mut spans = Vec::new();

        for (chunk_output, pieces) in chunk_outputs.iter().zip(embedded_pieces.into_iter()) {
            for piece in pieces {
                bodies.push(piece.text);
                vectors.push(piece.embedding);
                spans.push((chunk_output.span.start_char, chunk_output.span.end_char));
            }
        }

        let chunk_bodies: Vec<ChunkBody> = bodies
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let (start, end) = spans[index];
                ChunkBody {
                    text: text.clone(),
                    index,
                    metadata: ChunkBodyMetadata { start_char: start, end_char: end },
                }
            })
            .collect();

        // 8. Upload all blobs.
        self.blob_store
            .upload_document(
                document_uuid,
                original_bytes,
                mime_type,
                extracted_text,
                lexical_index,
                &chunk_bodies,
            )
            .await?;

        // 9. Insert chunk rows with their embeddings and char spans mirrored
        // from the blob metadata.
        for (index, vector) in vectors.iter().enumerate() {
            let (start, end) = spans[index];
            self.metadata_store
                .insert_chunk(
                    document_id,
                    index as i32,
                    vector,
                    Some(start as i32),
                    Some(end as i32),
                )
                .await?;
        }

        // 10. Record the final chunk count (may exceed the pre-embedding
        // count if any chunk overflowed and was split).
        self.metadata_store
            .update_chunk_count(document_id, vectors.len() as i32)
            .await?;

        Ok(())
    }

    /// Best-effort cleanup after a failure downstream of the document-row
    /// insert: delete the row and anything written to the blob store.
    async fn compensate(&self, document_id: i64, document_uuid: Uuid) {
        if let Err(e) = self.metadata_store.purge_by_id(document_id).await {
            tracing::error!(document_id, error = %e, "compensation failed to purge document row");
        }
        if let Err(e) = self.blob_store.delete_document(document_uuid).await {
            tracing::error!(%document_uuid, error = %e, "compensation failed to delete blobs");
        }
    }
}

fn mime_type_for(format: FormatTag) -> &'static str {
    match format {
        FormatTag::Pdf => "application/pdf",
        FormatTag::Json => "application/json",
        FormatTag::Xml => "application/xml",
        FormatTag::Yaml => "application/yaml",
        FormatTag::Text => "text/plain",
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable_and_distinct() {
        let a = hex_sha256(b"hello");
        let b = hex_sha256(b"hello");
        let c = hex_sha256(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn mime_type_matches_format_tag() {
        assert_eq!(mime_type_for(FormatTag::Pdf), "application/pdf");
        assert_eq!(mime_type_for(FormatTag::Text), "text/plain");
    }
}
