//! Embedding Engine (C3): turns chunk text into vectors, recovering from
//! provider-side "input too large" rejections by recursively splitting the
//! offending chunk rather than failing the whole document.

use crate::chunking::TextChunker;
use crate::error::{RagError, RagResult};
use crate::llm_client::LlmClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_SPLIT_DEPTH: u32 = 3;
const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(120);

/// A chunk that required splitting, plus the piece's place in the original
/// chunk index (parent chunks are replaced by their children in order).
#[derive(Debug, Clone)]
pub struct EmbeddedPiece {
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddingStats {
    pub splits: u32,
    pub max_depth_reached: u32,
}

pub struct EmbeddingEngine {
    client: Arc<LlmClient>,
    model: String,
    chunker: TextChunker,
    semaphore: Arc<Semaphore>,
}

impl EmbeddingEngine {
    pub fn new(client: Arc<LlmClient>, model: String, chunker: TextChunker, concurrency: usize) -> Self {
        Self {
            client,
            model,
            chunker,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Embed every chunk text in parallel, bounded by the configured
    /// concurrency cap. Returns one `EmbeddedPiece` list per input chunk —
    /// a chunk that overflowed the provider's input limit expands into
    /// multiple pieces; callers must flatten and re-index accordingly.
    pub async fn embed_all(&self, texts: &[String]) -> RagResult<(Vec<Vec<EmbeddedPiece>>, EmbeddingStats)> {
        let mut stats = EmbeddingStats::default();
        let mut futures = Vec::with_capacity(texts.len());

        for text in texts {
            let permit = self.semaphore.clone();
            let text = text.clone();
            futures.push(self.embed_one_with_overflow(text, permit));
        }

        let results = futures::future::join_all(futures).await;
        let mut out = Vec::with_capacity(results.len());
        for result in results {
            let (pieces, depth, splits) = result?;
            stats.splits += splits;
            stats.max_depth_reached = stats.max_depth_reached.max(depth);
            out.push(pieces);
        }

        Ok((out, stats))
    }

    async fn embed_one_with_overflow(
        &self,
        text: String,
        semaphore: Arc<Semaphore>,
    ) -> RagResult<(Vec<EmbeddedPiece>, u32, u32)> {
        self.embed_recursive(text, 0, semaphore).await
    }

    fn embed_recursive<'a>(
        &'a self,
        text: String,
        depth: u32,
        semaphore: Arc<Semaphore>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = RagResult<(Vec<EmbeddedPiece>, u32, u32)>> + Send + 'a>> {
        Box::pin(async move {
            match self.embed_single(&text, &semaphore).await {
                Ok(vector) => Ok((
                    vec![EmbeddedPiece {
                        text,
                        embedding: vector,
                    }],
                    depth,
                    0,
                )),
                Err(RagError::EmbeddingOverflow) if depth < MAX_SPLIT_DEPTH => {
                    tracing::debug!(depth, "embedding overflow, splitting chunk");
                    let (first, second) = self.chunker.split_on_overflow(&text);
                    let (mut first_pieces, first_depth, first_splits) =
                        self.embed_recursive(first, depth + 1, semaphore.clone()).await?;
                    let (second_pieces, second_depth, second_splits) =
                        self.embed_recursive(second, depth + 1, semaphore).await?;

                    first_pieces.extend(second_pieces);
                    Ok((
                        first_pieces,
                        first_depth.max(second_depth),
                        first_splits + second_splits + 1,
                    ))
                }
                Err(RagError::EmbeddingOverflow) => {
                    tracing::warn!(depth, "embedding overflow at max split depth, giving up");
                    Err(RagError::EmbeddingOverflow)
                }
                Err(other) => Err(other),
            }
        })
    }

    async fn embed_single(&self, text: &str, semaphore: &Semaphore) -> RagResult<Vec<f32>> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| RagError::Internal(anyhow::anyhow!("semaphore closed: {e}")))?;

        let inputs = vec![text.to_string()];
        let result = tokio::time::timeout(EMBEDDING_TIMEOUT, self.client.embed(&self.model, &inputs)).await;

        match result {
            Err(_) => Err(RagError::Timeout(EMBEDDING_TIMEOUT)),
            Ok(Err(e)) => {
                if matches!(e.status(), Some(413) | Some(400)) {
                    Err(RagError::EmbeddingOverflow)
                } else {
                    Err(RagError::EmbeddingFailure(e.to_string()))
                }
            }
            Ok(Ok(mut vectors)) => vectors
                .pop()
                .ok_or_else(|| RagError::EmbeddingFailure("provider returned no vectors".to_string())),
        }
    }

    /// Embed a single query string for the search path (no overflow
    /// recovery needed: queries are short by construction).
    pub async fn embed_query(&self, query: &str) -> RagResult<Vec<f32>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| RagError::Internal(anyhow::anyhow!("semaphore closed: {e}")))?;
        let inputs = vec![query.to_string()];
        self.client
            .embed(&self.model, &inputs)
            .await
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?
            .pop()
            .ok_or_else(|| RagError::EmbeddingFailure("provider returned no vectors".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_stats_default_to_zero() {
        let stats = EmbeddingStats::default();
        assert_eq!(stats.splits, 0);
        assert_eq!(stats.max_depth_reached, 0);
    }
}
