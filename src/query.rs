//! Query Orchestrator (C13): embeds the question, runs vector search (with
//! an optional metadata filter), optionally fuses in a BM25 lexical ranking
//! via RRF, optionally reranks, then hydrates chunk text for the final
//! response. A chunk whose owning document can't be resolved at all (e.g.
//! deleted between the vector search and hydration) is dropped; a chunk
//! whose document resolves but whose blob fetch fails keeps its place in
//! the result with a placeholder body and `fetch_error` set, per document
//! rather than per chunk.

use crate::blob_store::BlobStore;
use crate::config::RagConfig;
use crate::embedding::EmbeddingEngine;
use crate::error::RagResult;
use crate::lexical::tokenize;
use crate::metadata_store::{CompiledFilter, MetadataStore, SimilarityHit};
use crate::reranking::{RerankCandidate, Reranker};
use crate::search::{fuse_vector_and_lexical, lexical_ranking, Bm25Scorer, HybridCandidate};
use crate::types::Document;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_TOP_K: usize = 5;
const DEFAULT_RERANK_CANDIDATES: usize = 50;
const MIN_VECTOR_FETCH: usize = 100;
const FETCH_ERROR_PLACEHOLDER: &str = "[chunk unavailable: blob fetch failed]";

pub struct QueryEngine {
    metadata_store: Arc<MetadataStore>,
    blob_store: Arc<BlobStore>,
    embedding_engine: Arc<EmbeddingEngine>,
    reranker: Option<Arc<dyn Reranker>>,
    bm25: Bm25Scorer,
    rrf_k: usize,
}

#[derive(Debug, Clone)]
pub struct QueryHit {
    pub chunk_id: i64,
    pub document_id: i64,
    pub document_uuid: Uuid,
    pub filename: String,
    pub chunk_index: i32,
    pub user_metadata: HashMap<String, JsonValue>,
    pub chunk_text: String,
    pub similarity: f32,
    pub fetch_error: bool,
    pub rerank_score: Option<f32>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: Option<CompiledFilter>,
    pub min_similarity: Option<f32>,
    pub use_hybrid: Option<bool>,
    pub top_k: usize,
    pub rerank: bool,
    pub rerank_candidates: usize,
}

impl QueryEngine {
    pub fn new(
        metadata_store: Arc<MetadataStore>,
        blob_store: Arc<BlobStore>,
        embedding_engine: Arc<EmbeddingEngine>,
        reranker: Option<Arc<dyn Reranker>>,
        config: &RagConfig,
    ) -> Self {
        Self {
            metadata_store,
            blob_store,
            embedding_engine,
            reranker,
            bm25: Bm25Scorer::new(config.bm25_k1, config.bm25_b, config.bm25_avg_dl, config.bm25_boost),
            rrf_k: config.rrf_k,
        }
    }

    #[tracing::instrument(skip(self, options), fields(top_k = options.top_k))]
    pub async fn query(&self, query_text: &str, options: QueryOptions) -> RagResult<Vec<QueryHit>> {
        let top_k = effective_top_k(options.top_k);
        let min_similarity = options.min_similarity.unwrap_or(0.0);
        let use_hybrid = options.use_hybrid.unwrap_or(true);
        let rerank_requested = options.rerank && self.reranker.is_some();
        let rerank_candidates = effective_rerank_candidates(options.rerank_candidates);

        // 1. Embed the query.
        let query_embedding = self.embedding_engine.embed_query(query_text).await?;

        // 2. k_vector = rerank ? rerank_candidates : top_k. Over-fetch to at
        // least 100 when hybrid fusion will reorder the candidate set.
        let k_vector = if rerank_requested { rerank_candidates } else { top_k };
        let fetch_count = if use_hybrid { k_vector.max(MIN_VECTOR_FETCH) } else { k_vector };

        let vector_hits = self
            .metadata_store
            .search_similar(&query_embedding, options.filter.as_ref(), min_similarity, fetch_count)
            .await?;

        if vector_hits.is_empty() {
            tracing::debug!(query = query_text, "vector search returned no candidates");
            return Ok(Vec::new());
        }

        let vector_ranking: Vec<i64> = vector_hits.iter().map(|h| h.chunk.id).collect();
        let mut score_by_chunk: HashMap<i64, f32> =
            vector_hits.iter().map(|h| (h.chunk.id, h.score)).collect();
        let document_by_chunk: HashMap<i64, i64> =
            vector_hits.iter().map(|h| (h.chunk.id, h.chunk.document_id)).collect();
        let chunk_index_by_chunk: HashMap<i64, i32> =
            vector_hits.iter().map(|h| (h.chunk.id, h.chunk.chunk_index)).collect();

        // Resolve each distinct document once; its uuid/filename/metadata
        // are needed for the hybrid lexical-index fetch, hydration, and the
        // final response shape alike.
        let document_by_id = self.resolve_documents(&vector_hits).await;

        // 3. Hybrid branch (default on): fetch each document's lexical
        // index once, score every one of its candidate chunks with BM25
        // inherited from the document level, fuse with RRF, truncate to
        // k_vector.
        let fused_ranking = if use_hybrid {
            let candidates = self.build_hybrid_candidates(&vector_hits, &document_by_id).await;
            let query_terms = tokenize(query_text);
            let lex_ranking = lexical_ranking(&self.bm25, &query_terms, &candidates);
            let fused = fuse_vector_and_lexical(vector_ranking, lex_ranking, self.rrf_k);
            fused.into_iter().take(k_vector).collect()
        } else {
            vector_ranking
        };

        let mut ranked_ids = fused_ranking;

        let mut rerank_score_by_chunk: HashMap<i64, f32> = HashMap::new();
        let mut reasoning_by_chunk: HashMap<i64, String> = HashMap::new();

        // 4. Reranking branch (if requested): hydrate texts for the current
        // candidates, grouped by document uuid, call the reranker, and
        // replace the candidate list with its output order.
        if rerank_requested {
            let text_by_chunk = self
                .hydrate_grouped_by_document(&ranked_ids, &document_by_chunk, &chunk_index_by_chunk, &document_by_id)
                .await;

            let candidates: Vec<RerankCandidate> = ranked_ids
                .iter()
                .filter_map(|chunk_id| {
                    let (text, _) = text_by_chunk.get(chunk_id)?;
                    Some(RerankCandidate { chunk_id: *chunk_id, text: text.clone() })
                })
                .collect();

            if let Some(reranker) = &self.reranker {
                let reranked = reranker.rerank(query_text, &candidates, top_k).await?;
                ranked_ids = reranked.iter().map(|r| r.chunk_id).collect();
                for hit in &reranked {
                    rerank_score_by_chunk.insert(hit.chunk_id, hit.score);
                    if let Some(reasoning) = &hit.reasoning {
                        reasoning_by_chunk.insert(hit.chunk_id, reasoning.clone());
                    }
                }
            }

            // Already hydrated above; reuse rather than fetching twice.
            let hits = self.assemble(
                &ranked_ids,
                top_k,
                &document_by_chunk,
                &chunk_index_by_chunk,
                &document_by_id,
                &mut score_by_chunk,
                &rerank_score_by_chunk,
                &reasoning_by_chunk,
                Some(&text_by_chunk),
            )
            .await;

            tracing::debug!(query = query_text, hits = hits.len(), hybrid = use_hybrid, reranked = true, "query complete");
            return Ok(hits);
        }

        ranked_ids.truncate(top_k);

        // 5. Hydration: fetch chunk text for whatever wasn't already fetched
        // above (the non-rerank path never fetched yet).
        let hits = self.assemble(
            &ranked_ids,
            top_k,
            &document_by_chunk,
            &chunk_index_by_chunk,
            &document_by_id,
            &mut score_by_chunk,
            &rerank_score_by_chunk,
            &reasoning_by_chunk,
            None,
        )
        .await;

        tracing::debug!(query = query_text, hits = hits.len(), hybrid = use_hybrid, reranked = false, "query complete");
        Ok(hits)
    }

    #[allow(clippy::too_many_arguments)]
    async fn assemble(
        &self,
        ranked_ids: &[i64],
        top_k: usize,
        document_by_chunk: &HashMap<i64, i64>,
        chunk_index_by_chunk: &HashMap<i64, i32>,
        document_by_id: &HashMap<i64, Document>,
        score_by_chunk: &mut HashMap<i64, f32>,
        rerank_score_by_chunk: &HashMap<i64, f32>,
        reasoning_by_chunk: &HashMap<i64, String>,
        already_hydrated: Option<&HashMap<i64, (String, bool)>>,
    ) -> Vec<QueryHit> {
        let text_by_chunk = match already_hydrated {
            Some(map) => map.clone(),
            None => {
                self.hydrate_grouped_by_document(ranked_ids, document_by_chunk, chunk_index_by_chunk, document_by_id)
                    .await
            }
        };

        ranked_ids
            .iter()
            .take(top_k)
            .filter_map(|chunk_id| {
                let document_id = *document_by_chunk.get(chunk_id)?;
                let document = document_by_id.get(&document_id)?;
                let chunk_index = chunk_index_by_chunk.get(chunk_id).copied().unwrap_or(0);
                let (chunk_text, fetch_error) = text_by_chunk
                    .get(chunk_id)
                    .cloned()
                    .unwrap_or_else(|| (FETCH_ERROR_PLACEHOLDER.to_string(), true));
                let similarity = score_by_chunk.remove(chunk_id).unwrap_or(0.0);

                Some(QueryHit {
                    chunk_id: *chunk_id,
                    document_id,
                    document_uuid: document.uuid,
                    filename: document.filename.clone(),
                    chunk_index,
                    user_metadata: document.user_metadata.clone(),
                    chunk_text,
                    similarity,
                    fetch_error,
                    rerank_score: rerank_score_by_chunk.get(chunk_id).copied(),
                    reasoning: reasoning_by_chunk.get(chunk_id).cloned(),
                })
            })
            .collect()
    }

    async fn resolve_documents(&self, vector_hits: &[SimilarityHit]) -> HashMap<i64, Document> {
        let mut document_ids: Vec<i64> = vector_hits.iter().map(|h| h.chunk.document_id).collect();
        document_ids.sort_unstable();
        document_ids.dedup();

        let mut documents = HashMap::with_capacity(document_ids.len());
        for document_id in document_ids {
            if let Ok(Some(document)) = self.metadata_store.find_by_id(document_id).await {
                documents.insert(document_id, document);
            }
        }
        documents
    }

    async fn build_hybrid_candidates(
        &self,
        vector_hits: &[SimilarityHit],
        document_by_id: &HashMap<i64, Document>,
    ) -> Vec<HybridCandidate> {
        let mut lexical_index_by_document: HashMap<i64, crate::types::LexicalIndex> = HashMap::new();
        for (&document_id, document) in document_by_id {
            if let Ok(index) = self.blob_store.fetch_bm25_index(document.uuid).await {
                lexical_index_by_document.insert(document_id, index);
            }
        }

        vector_hits
            .iter()
            .filter_map(|hit| {
                let document = document_by_id.get(&hit.chunk.document_id)?;
                let lexical_index = lexical_index_by_document.get(&hit.chunk.document_id)?.clone();
                Some(HybridCandidate {
                    chunk_id: hit.chunk.id,
                    document_id: hit.chunk.document_id,
                    lexical_index,
                    keywords: document.keywords.clone(),
                })
            })
            .collect()
    }

    /// Fetch chunk text for the given chunk ids, grouped by document uuid
    /// and fetched in parallel across documents. A document whose blob
    /// fetch fails marks every one of its candidate chunks with a
    /// `fetch_error` flag rather than dropping them or failing the query.
    async fn hydrate_grouped_by_document(
        &self,
        chunk_ids: &[i64],
        document_by_chunk: &HashMap<i64, i64>,
        chunk_index_by_chunk: &HashMap<i64, i32>,
        document_by_id: &HashMap<i64, Document>,
    ) -> HashMap<i64, (String, bool)> {
        let mut by_document: HashMap<i64, Vec<(i64, usize)>> = HashMap::new();
        for &chunk_id in chunk_ids {
            if let Some(&document_id) = document_by_chunk.get(&chunk_id) {
                let chunk_index = chunk_index_by_chunk.get(&chunk_id).copied().unwrap_or(0) as usize;
                by_document.entry(document_id).or_default().push((chunk_id, chunk_index));
            }
        }

        let fetches = by_document.into_iter().map(|(document_id, chunk_refs)| async move {
            let uuid = document_by_id.get(&document_id).map(|d| d.uuid);
            let indices: Vec<usize> = chunk_refs.iter().map(|(_, idx)| *idx).collect();

            let texts = match uuid {
                Some(uuid) => self.blob_store.fetch_chunks(uuid, &indices).await.ok(),
                None => None,
            };

            match texts {
                Some(texts) if texts.len() == chunk_refs.len() => chunk_refs
                    .into_iter()
                    .zip(texts)
                    .map(|((chunk_id, _), text)| (chunk_id, (text, false)))
                    .collect::<Vec<_>>(),
                _ => chunk_refs
                    .into_iter()
                    .map(|(chunk_id, _)| (chunk_id, (FETCH_ERROR_PLACEHOLDER.to_string(), true)))
                    .collect::<Vec<_>>(),
            }
        });

        futures::future::join_all(fetches).await.into_iter().flatten().collect()
    }
}

fn effective_top_k(requested: usize) -> usize {
    if requested == 0 {
        DEFAULT_TOP_K
    } else {
        requested
    }
}

fn effective_rerank_candidates(requested: usize) -> usize {
    if requested == 0 {
        DEFAULT_RERANK_CANDIDATES
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_top_k_to_five_when_unset() {
        assert_eq!(effective_top_k(0), DEFAULT_TOP_K);
    }

    #[test]
    fn keeps_explicit_top_k() {
        assert_eq!(effective_top_k(5), 5);
    }

    #[test]
    fn defaults_rerank_candidates_to_fifty() {
        assert_eq!(effective_rerank_candidates(0), DEFAULT_RERANK_CANDIDATES);
    }
}
