//! Environment-style configuration, layered through the `config` crate over
//! `std::env`, mirroring the upstream `RAGConfig::default()` / `validate()`
//! pattern but sourced from the variables §6 enumerates rather than a JSON
//! file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RerankerType {
    Llm,
    CrossEncoder,
    Api,
}

impl std::str::FromStr for RerankerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "cross-encoder" | "cross_encoder" => Ok(Self::CrossEncoder),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown reranker type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub vector_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_concurrency: usize,
    pub blob_concurrency: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub bm25_avg_dl: f32,
    pub bm25_boost: f32,
    pub rrf_k: usize,
    pub reranker_enabled: bool,
    pub reranker_type: RerankerType,
    pub reranker_model: String,
    pub llm_extraction_model: String,
    pub min_similarity_default: f32,
}

impl RagConfig {
    /// Load configuration from environment variables, falling back to
    /// `Default` for anything unset. Variable names match §6 exactly.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let cfg = config::Config::builder()
            .set_default("vector_dimension", defaults.vector_dimension as i64)
            .map_err(|e| e.to_string())?
            .set_default("chunk_size", defaults.chunk_size as i64)
            .map_err(|e| e.to_string())?
            .set_default("chunk_overlap", defaults.chunk_overlap as i64)
            .map_err(|e| e.to_string())?
            .set_default("embedding_concurrency", defaults.embedding_concurrency as i64)
            .map_err(|e| e.to_string())?
            .set_default("blob_concurrency", defaults.blob_concurrency as i64)
            .map_err(|e| e.to_string())?
            .set_default("bm25_k1", defaults.bm25_k1 as f64)
            .map_err(|e| e.to_string())?
            .set_default("bm25_b", defaults.bm25_b as f64)
            .map_err(|e| e.to_string())?
            .set_default("bm25_avg_dl", defaults.bm25_avg_dl as f64)
            .map_err(|e| e.to_string())?
            .set_default("bm25_boost", defaults.bm25_boost as f64)
            .map_err(|e| e.to_string())?
            .set_default("rrf_k", defaults.rrf_k as i64)
            .map_err(|e| e.to_string())?
            .set_default("reranker_enabled", defaults.reranker_enabled)
            .map_err(|e| e.to_string())?
            .set_default("reranker_type", "llm")
            .map_err(|e| e.to_string())?
            .set_default("reranker_model", defaults.reranker_model.clone())
            .map_err(|e| e.to_string())?
            .set_default("llm_extraction_model", defaults.llm_extraction_model.clone())
            .map_err(|e| e.to_string())?
            .set_default("min_similarity_default", defaults.min_similarity_default as f64)
            .map_err(|e| e.to_string())?
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()
            .map_err(|e| e.to_string())?;

        let reranker_type_raw: String = cfg.get("reranker_type").map_err(|e| e.to_string())?;
        let reranker_type: RerankerType = reranker_type_raw.parse()?;

        let built = Self {
            vector_dimension: cfg.get::<i64>("vector_dimension").map_err(|e| e.to_string())? as usize,
            chunk_size: cfg.get::<i64>("chunk_size").map_err(|e| e.to_string())? as usize,
            chunk_overlap: cfg.get::<i64>("chunk_overlap").map_err(|e| e.to_string())? as usize,
            embedding_concurrency: cfg.get::<i64>("embedding_concurrency").map_err(|e| e.to_string())? as usize,
            blob_concurrency: cfg.get::<i64>("blob_concurrency").map_err(|e| e.to_string())? as usize,
            bm25_k1: cfg.get::<f64>("bm25_k1").map_err(|e| e.to_string())? as f32,
            bm25_b: cfg.get::<f64>("bm25_b").map_err(|e| e.to_string())? as f32,
            bm25_avg_dl: cfg.get::<f64>("bm25_avg_dl").map_err(|e| e.to_string())? as f32,
            bm25_boost: cfg.get::<f64>("bm25_boost").map_err(|e| e.to_string())? as f32,
            rrf_k: cfg.get::<i64>("rrf_k").map_err(|e| e.to_string())? as usize,
            reranker_enabled: cfg.get("reranker_enabled").map_err(|e| e.to_string())?,
            reranker_type,
            reranker_model: cfg.get("reranker_model").map_err(|e| e.to_string())?,
            llm_extraction_model: cfg.get("llm_extraction_model").map_err(|e| e.to_string())?,
            min_similarity_default: cfg.get::<f64>("min_similarity_default").map_err(|e| e.to_string())? as f32,
        };

        built.validate()?;
        Ok(built)
    }

    /// Reject unusable combinations the way the upstream config validates
    /// before it is handed to the stores.
    pub fn validate(&self) -> Result<(), String> {
        if self.vector_dimension == 0 {
            return Err("vector_dimension must be > 0".into());
        }
        if self.chunk_size < 50 {
            return Err("chunk_size must be >= 50".into());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err("chunk_overlap must be < chunk_size".into());
        }
        if self.embedding_concurrency == 0 || self.blob_concurrency == 0 {
            return Err("concurrency caps must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.min_similarity_default) {
            return Err("min_similarity_default must be in [0.0, 1.0]".into());
        }
        Ok(())
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            vector_dimension: 768,
            chunk_size: 2000,
            chunk_overlap: 200,
            embedding_concurrency: 10,
            blob_concurrency: 10,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            bm25_avg_dl: 1000.0,
            bm25_boost: 1.5,
            rrf_k: 60,
            reranker_enabled: false,
            reranker_type: RerankerType::Llm,
            reranker_model: "gpt-4o-mini".to_string(),
            llm_extraction_model: "gpt-4o-mini".to_string(),
            min_similarity_default: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut cfg = RagConfig::default();
        cfg.chunk_overlap = cfg.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut cfg = RagConfig::default();
        cfg.vector_dimension = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reranker_type_parses_case_insensitively() {
        assert_eq!("LLM".parse::<RerankerType>().unwrap(), RerankerType::Llm);
        assert_eq!(
            "cross-encoder".parse::<RerankerType>().unwrap(),
            RerankerType::CrossEncoder
        );
        assert!("bogus".parse::<RerankerType>().is_err());
    }
}
