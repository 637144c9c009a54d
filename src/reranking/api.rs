//! External-API reranker: delegates scoring to a vendor rerank endpoint
//! (e.g. Cohere-style `/v1/rerank`) in a single call per request rather than
//! the LLM variant's per-batch chat completions.

use super::{RerankCandidate, RerankedHit, Reranker};
use crate::error::{RagError, RagResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ApiRerankResult {
    index: usize,
    relevance_score: f32,
}

#[derive(Debug, Deserialize)]
struct ApiRerankResponse {
    results: Vec<ApiRerankResult>,
}

pub struct ApiReranker {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ApiReranker {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> RagResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::RerankerUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Reranker for ApiReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> RagResult<Vec<RerankedHit>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_k,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::RerankerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::RerankerUnavailable(format!(
                "rerank endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ApiRerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::RerankerUnavailable(format!("failed to parse rerank response: {e}")))?;

        let hits: Vec<RerankedHit> = parsed
            .results
            .into_iter()
            .filter_map(|r| {
                candidates.get(r.index).map(|candidate| RerankedHit {
                    chunk_id: candidate.chunk_id,
                    score: r.relevance_score,
                    reasoning: None,
                })
            })
            .take(top_k)
            .collect();

        Ok(hits)
    }

    fn model_info(&self) -> &str {
        &self.model
    }
}
