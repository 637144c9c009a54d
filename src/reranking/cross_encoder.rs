//! Cross-encoder reranker: a local ONNX pair-scoring model (e.g.
//! ms-marco-MiniLM), scoring `(query, document)` pairs directly rather than
//! going through an embedding similarity. Lazily loaded on first use since
//! the model and tokenizer files are only needed when this variant is
//! actually selected.

use super::{RerankCandidate, RerankedHit, Reranker};
use crate::error::{RagError, RagResult};
use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_BATCH: usize = 16;
const MAX_SEQUENCE_LENGTH: usize = 512;

pub struct CrossEncoderReranker {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    model_name: String,
}

impl CrossEncoderReranker {
    pub fn load(model_dir: &Path) -> RagResult<Self> {
        let model_path = Self::find_model(model_dir)?;
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !tokenizer_path.exists() {
            return Err(RagError::RerankerUnavailable(format!(
                "tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| RagError::RerankerUnavailable(format!("failed to load tokenizer: {e:?}")))?;

        let model_bytes = std::fs::read(&model_path)
            .map_err(|e| RagError::RerankerUnavailable(format!("failed to read model file: {e}")))?;

        let session = (|| -> ort::Result<Session> {
            Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_memory(&model_bytes)
        })()
        .map_err(|e| RagError::RerankerUnavailable(format!("failed to load cross-encoder model: {e:?}")))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name: model_path.display().to_string(),
        })
    }

    fn find_model(model_dir: &Path) -> RagResult<PathBuf> {
        let candidates = [model_dir.join("model_quantized.onnx"), model_dir.join("model.onnx")];
        for candidate in &candidates {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
        }
        Err(RagError::RerankerUnavailable(format!(
            "no cross-encoder model found in {}",
            model_dir.display()
        )))
    }

    fn score_batch(&self, query: &str, texts: &[&str]) -> RagResult<Vec<f32>> {
        let encodings: Vec<_> = texts
            .iter()
            .filter_map(|text| self.tokenizer.encode((query, *text), true).ok())
            .collect();

        if encodings.is_empty() {
            return Ok(vec![0.0; texts.len()]);
        }

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_SEQUENCE_LENGTH))
            .max()
            .unwrap_or(1);
        let batch_size = encodings.len();

        let mut ids_flat = Vec::with_capacity(batch_size * max_len);
        let mut mask_flat = Vec::with_capacity(batch_size * max_len);
        let mut type_flat = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let len = encoding.get_ids().len().min(max_len);
            for i in 0..len {
                ids_flat.push(encoding.get_ids()[i] as i64);
                mask_flat.push(encoding.get_attention_mask()[i] as i64);
                type_flat.push(encoding.get_type_ids()[i] as i64);
            }
            for _ in len..max_len {
                ids_flat.push(0i64);
                mask_flat.push(0i64);
                type_flat.push(0i64);
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids = Value::from_array((shape.clone(), ids_flat))
            .map_err(|e| RagError::RerankerUnavailable(format!("input_ids tensor: {e:?}")))?;
        let attention_mask = Value::from_array((shape.clone(), mask_flat))
            .map_err(|e| RagError::RerankerUnavailable(format!("attention_mask tensor: {e:?}")))?;
        let token_type_ids = Value::from_array((shape, type_flat))
            .map_err(|e| RagError::RerankerUnavailable(format!("token_type_ids tensor: {e:?}")))?;

        let inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
        ];

        let mut session = self.session.lock();
        let outputs = session
            .run(inputs)
            .map_err(|e| RagError::RerankerUnavailable(format!("inference failed: {e:?}")))?;

        let output_key = outputs
            .iter()
            .next()
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| "logits".to_string());
        let (_shape, data) = outputs[output_key.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::RerankerUnavailable(format!("failed to extract logits: {e:?}")))?;

        let mut scores = vec![0.0f32; texts.len()];
        for (i, score) in data.iter().enumerate().take(encodings.len()) {
            scores[i] = *score;
        }
        Ok(scores)
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> RagResult<Vec<RerankedHit>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<RerankedHit> = Vec::with_capacity(candidates.len());
        for chunk in candidates.chunks(MAX_BATCH) {
            let texts: Vec<&str> = chunk.iter().map(|c| c.text.as_str()).collect();
            let scores = self.score_batch(query, &texts)?;
            for (candidate, score) in chunk.iter().zip(scores.into_iter()) {
                hits.push(RerankedHit { chunk_id: candidate.chunk_id, score, reasoning: None });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn model_info(&self) -> &str {
        &self.model_name
    }
}
