//! Reranker (C11): pluggable final-stage relevance scoring over the
//! RRF-fused candidate set. Three interchangeable variants sit behind one
//! trait so the Query Orchestrator never branches on which is configured.

mod api;
mod cross_encoder;
mod llm;

pub use api::ApiReranker;
pub use cross_encoder::CrossEncoderReranker;
pub use llm::LlmReranker;

use crate::error::RagResult;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// One candidate passed into a reranker: its identity plus the text to
/// score against the query.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub chunk_id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RerankedHit {
    pub chunk_id: i64,
    pub score: f32,
    /// Only the LLM variant fills this in; API and cross-encoder rerankers
    /// don't return a rationale.
    pub reasoning: Option<String>,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> RagResult<Vec<RerankedHit>>;

    fn model_info(&self) -> &str;
}

static SINGLETON: OnceCell<Arc<dyn Reranker>> = OnceCell::new();

/// Return the process-wide cached reranker instance, constructing it from
/// `builder` on first access. Mirrors the upstream pattern of loading the
/// (potentially expensive) reranker model once and sharing it across
/// requests rather than per query.
pub fn cached_reranker(builder: impl FnOnce() -> RagResult<Arc<dyn Reranker>>) -> RagResult<Arc<dyn Reranker>> {
    if let Some(existing) = SINGLETON.get() {
        return Ok(existing.clone());
    }
    let built = builder()?;
    tracing::info!(model = built.model_info(), "reranker instantiated");
    let _ = SINGLETON.set(built.clone());
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubReranker;

    #[async_trait]
    impl Reranker for StubReranker {
        async fn rerank(
            &self,
            _query: &str,
            candidates: &[RerankCandidate],
            top_k: usize,
        ) -> RagResult<Vec<RerankedHit>> {
            Ok(candidates
                .iter()
                .take(top_k)
                .map(|c| RerankedHit { chunk_id: c.chunk_id, score: 1.0, reasoning: None })
                .collect())
        }

        fn model_info(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn stub_reranker_respects_top_k() {
        let reranker = StubReranker;
        let candidates = vec![
            RerankCandidate { chunk_id: 1, text: "a".into() },
            RerankCandidate { chunk_id: 2, text: "b".into() },
        ];
        let hits = reranker.rerank("q", &candidates, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
