//! Document ingestion and hybrid-search core for a multi-tenant RAG service.
//!
//! Two pipelines sit on top of the modules below: `ingest::Ingestor` turns
//! an uploaded file into chunks, embeddings, and a lexical index spread
//! across the relational Metadata Store and the Blob Store; `query::
//! QueryEngine` turns a question into a ranked, optionally reranked, set of
//! chunk hits.

pub mod blob_store;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod ingest;
pub mod lexical;
pub mod llm_client;
pub mod metadata_store;
pub mod query;
pub mod reranking;
pub mod search;
pub mod summarize;
pub mod types;
pub mod validation;

pub use config::RagConfig;
pub use error::{RagError, RagResult};
pub use ingest::Ingestor;
pub use query::QueryEngine;
