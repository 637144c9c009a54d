//! Metadata Store (C6): the relational index over documents and chunks.
//! `documents` carries system + user metadata and the LLM summary/keywords;
//! `chunks` carries the embedding vector and char span. Chunk bodies
//! themselves live in the Blob Store — this table is an index, not a
//! payload store.

mod filter;

pub use filter::{CompiledFilter, FilterExpr};

use crate::error::{RagError, RagResult};
use crate::types::{Chunk, Document};
use serde_json::Value as JsonValue;
use sqlx::error::DatabaseError;
use sqlx::postgres::{PgDatabaseError, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Postgres SQLSTATE for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Outcome of `insert_document`: either the row was created, or a
/// concurrent upload of the same content won the race and the caller
/// should treat this as the idempotent-duplicate path instead.
pub enum InsertDocumentOutcome {
    Inserted(i64),
    Duplicate(Document),
}

pub struct MetadataStore {
    pool: PgPool,
}

/// A scored hit returned from `search_similar`: the chunk row plus its
/// cosine-similarity score against the query vector.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub chunk: Chunk,
    pub score: f32,
}

impl MetadataStore {
    pub async fn connect(database_url: &str, vector_dimension: usize) -> RagResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.ensure_pgvector_extension().await?;
        store.ensure_schema(vector_dimension).await?;
        tracing::info!(vector_dimension, "metadata store connected and schema ensured");
        Ok(store)
    }

    async fn ensure_pgvector_extension(&self) -> RagResult<()> {
        let exists = sqlx::query("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn ensure_schema(&self, vector_dimension: usize) -> RagResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                uuid UUID NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes BIGINT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                chunk_count INT NOT NULL DEFAULT 0,
                uploaded_by TEXT NOT NULL,
                uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                uploaded_via TEXT NOT NULL,
                user_metadata JSONB NOT NULL DEFAULT '{}',
                summary TEXT,
                keywords JSONB NOT NULL DEFAULT '[]',
                token_count INT,
                deleted_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS documents_user_metadata_gin ON documents USING GIN (user_metadata)")
            .execute(&self.pool)
            .await?;

        let create_chunks = format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id BIGSERIAL PRIMARY KEY,
                document_id BIGINT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INT NOT NULL,
                embedding vector({vector_dimension}),
                start_char INT,
                end_char INT,
                UNIQUE (document_id, chunk_index)
            )
            "#
        );
        sqlx::query(&create_chunks).execute(&self.pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS chunks_embedding_hnsw ON chunks USING hnsw (embedding vector_cosine_ops)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_hash(&self, content_hash: &str) -> RagResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, uuid, filename, mime_type, size_bytes, content_hash, chunk_count, \
             uploaded_by, uploaded_at, uploaded_via, user_metadata, summary, keywords, token_count \
             FROM documents WHERE content_hash = $1 AND deleted_at IS NULL",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_document).transpose()
    }

    pub async fn find_by_id(&self, document_id: i64) -> RagResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, uuid, filename, mime_type, size_bytes, content_hash, chunk_count, \
             uploaded_by, uploaded_at, uploaded_via, user_metadata, summary, keywords, token_count \
             FROM documents WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_document).transpose()
    }

    pub async fn insert_document(
        &self,
        uuid: Uuid,
        filename: &str,
        mime_type: &str,
        size_bytes: i64,
        content_hash: &str,
        uploaded_by: &str,
        uploaded_via: &str,
        user_metadata: &HashMap<String, JsonValue>,
        summary: &str,
        keywords: &[String],
        token_count: Option<i32>,
    ) -> RagResult<InsertDocumentOutcome> {
        let user_metadata_json = serde_json::to_value(user_metadata)?;
        let keywords_json = serde_json::to_value(keywords)?;

        let result = sqlx::query(
            "INSERT INTO documents \
             (uuid, filename, mime_type, size_bytes, content_hash, uploaded_by, uploaded_via, \
              user_metadata, summary, keywords, token_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING id",
        )
        .bind(uuid)
        .bind(filename)
        .bind(mime_type)
        .bind(size_bytes)
        .bind(content_hash)
        .bind(uploaded_by)
        .bind(uploaded_via)
        .bind(user_metadata_json)
        .bind(summary)
        .bind(keywords_json)
        .bind(token_count)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(InsertDocumentOutcome::Inserted(row.try_get("id")?)),
            Err(sqlx::Error::Database(db_err)) if is_content_hash_violation(db_err.as_ref()) => {
                tracing::info!(%content_hash, "content_hash unique violation, concurrent upload won the race");
                let existing = self.find_by_hash(content_hash).await?.ok_or_else(|| {
                    RagError::Internal(anyhow::anyhow!(
                        "content_hash unique violation but no matching row found for {content_hash}"
                    ))
                })?;
                Ok(InsertDocumentOutcome::Duplicate(existing))
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn insert_chunk(
        &self,
        document_id: i64,
        chunk_index: i32,
        embedding: &[f32],
        start_char: Option<i32>,
        end_char: Option<i32>,
    ) -> RagResult<i64> {
        let vector_literal = to_pgvector_literal(embedding);
        let row = sqlx::query(
            "INSERT INTO chunks (document_id, chunk_index, embedding, start_char, end_char) \
             VALUES ($1, $2, $3::vector, $4, $5) \
             ON CONFLICT (document_id, chunk_index) DO UPDATE \
             SET embedding = EXCLUDED.embedding, start_char = EXCLUDED.start_char, end_char = EXCLUDED.end_char \
             RETURNING id",
        )
        .bind(document_id)
        .bind(chunk_index)
        .bind(vector_literal)
        .bind(start_char)
        .bind(end_char)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    pub async fn update_chunk_count(&self, document_id: i64, chunk_count: i32) -> RagResult<()> {
        sqlx::query("UPDATE documents SET chunk_count = $1 WHERE id = $2")
            .bind(chunk_count)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Vector similarity search with an optional compiled metadata filter
    /// and minimum-similarity floor. `top_k` bounds the result count.
    pub async fn search_similar(
        &self,
        query_embedding: &[f32],
        filter: Option<&CompiledFilter>,
        min_similarity: f32,
        top_k: usize,
    ) -> RagResult<Vec<SimilarityHit>> {
        let vector_literal = to_pgvector_literal(query_embedding);

        let mut sql = String::from(
            "SELECT c.id, c.document_id, c.chunk_index, c.start_char, c.end_char, \
             1 - (c.embedding <=> $1::vector) AS score \
             FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE d.deleted_at IS NULL",
        );

        let mut bind_index = 2usize;
        if let Some(filter) = filter {
            let filter_clause = filter.render_with_offset(&mut bind_index);
            sql.push_str(" AND ");
            sql.push_str(&filter_clause);
        }

        sql.push_str(&format!(" AND 1 - (c.embedding <=> $1::vector) >= ${bind_index}"));
        bind_index += 1;

        sql.push_str(" ORDER BY c.embedding <=> $1::vector ASC LIMIT ");
        sql.push_str(&format!("${bind_index}"));

        let mut query = sqlx::query(&sql).bind(vector_literal);
        if let Some(filter) = filter {
            for value in filter.bind_values() {
                query = bind_json_value(query, value);
            }
        }
        query = query.bind(min_similarity);
        query = query.bind(top_k as i64);

        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                Ok(SimilarityHit {
                    chunk: Chunk {
                        id: row.try_get("id")?,
                        document_id: row.try_get("document_id")?,
                        chunk_index: row.try_get("chunk_index")?,
                        embedding: Vec::new(),
                        start_char: row.try_get("start_char")?,
                        end_char: row.try_get("end_char")?,
                    },
                    score: row.try_get::<f64, _>("score")? as f32,
                })
            })
            .collect()
    }

    pub async fn delete_by_id(&self, document_id: i64) -> RagResult<()> {
        sqlx::query("UPDATE documents SET deleted_at = NOW() WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Hard-delete a document row, used by ingestion compensation when a
    /// later step fails and the partially-inserted row must be removed
    /// rather than soft-deleted.
    pub async fn purge_by_id(&self, document_id: i64) -> RagResult<()> {
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// True when `err` is a Postgres unique-violation on the `documents`
/// table's `content_hash` column, however that constraint happens to be
/// named (the implicit column-level `UNIQUE` generates its own name).
fn is_content_hash_violation(err: &dyn DatabaseError) -> bool {
    if err.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return false;
    }
    err.try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg_err| pg_err.constraint())
        .map(|c| c.contains("content_hash"))
        .unwrap_or(false)
}

fn row_to_document(row: sqlx::postgres::PgRow) -> RagResult<Document> {
    let user_metadata_json: JsonValue = row.try_get("user_metadata")?;
    let user_metadata: HashMap<String, JsonValue> = match user_metadata_json {
        JsonValue::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    let keywords_json: JsonValue = row.try_get("keywords")?;
    let keywords: Vec<String> = serde_json::from_value(keywords_json).unwrap_or_default();

    Ok(Document {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        filename: row.try_get("filename")?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: row.try_get("size_bytes")?,
        content_hash: row.try_get("content_hash")?,
        chunk_count: row.try_get("chunk_count")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at: row.try_get("uploaded_at")?,
        uploaded_via: row.try_get("uploaded_via")?,
        user_metadata,
        summary: row.try_get("summary")?,
        keywords,
        token_count: row.try_get("token_count")?,
    })
}

fn to_pgvector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn bind_json_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q JsonValue,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        JsonValue::String(s) => query.bind(s.as_str()),
        JsonValue::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap()),
        JsonValue::Number(n) => query.bind(n.as_f64().unwrap_or(0.0)),
        JsonValue::Bool(b) => query.bind(*b),
        other => query.bind(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgvector_literal_formats_as_bracketed_list() {
        assert_eq!(to_pgvector_literal(&[1.0, 2.5, -3.0]), "[1,2.5,-3]");
    }

    #[test]
    fn pgvector_literal_handles_empty_vector() {
        assert_eq!(to_pgvector_literal(&[]), "[]");
    }
}
