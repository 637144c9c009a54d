//! LLM batch reranker: splits candidates into small batches, asks the model
//! to score each batch as a JSON array of `{index, relevance_score,
//! reasoning}`, and normalises the 0-10 scale to 0-1. Batches run in
//! parallel bounded by a semaphore; a batch the model only partially scores
//! still returns a result, with unscored indices defaulting to zero rather
//! than failing the whole rerank.

use super::{RerankCandidate, RerankedHit, Reranker};
use crate::error::RagResult;
use crate::llm_client::{first_choice_content, LlmClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

const DEFAULT_BATCH_SIZE: usize = 2;
const MAX_CONCURRENT_BATCHES: usize = 10;
const TEMPERATURE: f32 = 0.0;
const MAX_OUTPUT_TOKENS: u32 = 512;

pub struct LlmReranker {
    client: Arc<LlmClient>,
    model: String,
    batch_size: usize,
    semaphore: Arc<Semaphore>,
}

#[derive(Debug, Deserialize)]
struct ScoredEntry {
    index: usize,
    relevance_score: f32,
    #[serde(default)]
    reasoning: String,
}

impl LlmReranker {
    pub fn new(client: Arc<LlmClient>, model: String) -> Self {
        Self {
            client,
            model,
            batch_size: DEFAULT_BATCH_SIZE,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_BATCHES)),
        }
    }

    async fn score_batch(&self, query: &str, batch: &[RerankCandidate]) -> Vec<(f32, Option<String>)> {
        let _permit = self.semaphore.acquire().await;

        let prompt = build_prompt(query, batch);
        let response = self
            .client
            .chat_json(&self.model, &prompt, TEMPERATURE, MAX_OUTPUT_TOKENS)
            .await;

        let mut scored = vec![(0.0f32, None); batch.len()];

        let response = match response {
            Ok(r) => r,
            Err(_) => return scored,
        };

        let content = match first_choice_content(&response) {
            Some(c) => c,
            None => return scored,
        };

        let entries: Vec<ScoredEntry> = match serde_json::from_str(content) {
            Ok(e) => e,
            Err(_) => return scored,
        };

        for entry in entries {
            if entry.index < scored.len() {
                let score = (entry.relevance_score / 10.0).clamp(0.0, 1.0);
                let reasoning = if entry.reasoning.is_empty() { None } else { Some(entry.reasoning) };
                scored[entry.index] = (score, reasoning);
            }
        }

        scored
    }
}

fn build_prompt(query: &str, batch: &[RerankCandidate]) -> String {
    let documents: String = batch
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{i}] {}", c.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Score how relevant each document is to the query on a 0-10 scale.\n\n\
         Query: \"{query}\"\n\n\
         Documents:\n{documents}\n\n\
         Output format (valid JSON array, one entry per document):\n\
         [{{\"index\": 0, \"relevance_score\": 7.5, \"reasoning\": \"...\"}}]"
    )
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> RagResult<Vec<RerankedHit>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<&[RerankCandidate]> = candidates.chunks(self.batch_size).collect();
        let scored_batches = futures::future::join_all(
            batches.iter().map(|batch| self.score_batch(query, batch)),
        )
        .await;

        let mut hits: Vec<RerankedHit> = Vec::with_capacity(candidates.len());
        for (batch, scores) in batches.iter().zip(scored_batches.iter()) {
            for (candidate, (score, reasoning)) in batch.iter().zip(scores.iter()) {
                hits.push(RerankedHit {
                    chunk_id: candidate.chunk_id,
                    score: *score,
                    reasoning: reasoning.clone(),
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn model_info(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_enumerates_documents_from_zero() {
        let batch = vec![
            RerankCandidate { chunk_id: 1, text: "alpha".into() },
            RerankCandidate { chunk_id: 2, text: "beta".into() },
        ];
        let prompt = build_prompt("q", &batch);
        assert!(prompt.contains("[0] alpha"));
        assert!(prompt.contains("[1] beta"));
    }

    #[test]
    fn scored_entry_parses_from_expected_shape() {
        let json = r#"[{"index": 0, "relevance_score": 8.0, "reasoning": "matches"}]"#;
        let entries: Vec<ScoredEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].relevance_score, 8.0);
    }
}
