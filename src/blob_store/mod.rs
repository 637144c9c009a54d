//! Blob Store (C7): the payload side of the two-store split. Holds the
//! original bytes, extracted text, per-chunk JSON bodies, and the lexical
//! index, keyed under the document's UUID. The relational store is the
//! index over these objects, never a copy of their content.

use crate::error::RagError;
use crate::types::{ChunkBody, LexicalIndex};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use uuid::Uuid;

pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
}

struct ChunkUpload {
    index: usize,
    body: ChunkBody,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    fn original_path(uuid: Uuid) -> ObjectPath {
        ObjectPath::from(format!("{uuid}/original"))
    }

    fn extracted_path(uuid: Uuid) -> ObjectPath {
        ObjectPath::from(format!("{uuid}/extracted.txt"))
    }

    fn bm25_index_path(uuid: Uuid) -> ObjectPath {
        ObjectPath::from(format!("{uuid}/bm25_doc_index.json"))
    }

    fn chunk_path(uuid: Uuid, index: usize) -> ObjectPath {
        ObjectPath::from(format!("{uuid}/chunks/{index:03}.json"))
    }

    /// Upload the original bytes, extracted text, lexical index, and every
    /// chunk body for a document, bounded by the configured concurrency cap.
    /// All-or-nothing from the caller's perspective: the first failure is
    /// surfaced, though objects already written remain (the Ingestion
    /// Orchestrator's compensation step cleans those up, not this method).
    pub async fn upload_document(
        &self,
        uuid: Uuid,
        original_bytes: &[u8],
        original_mime: &str,
        extracted_text: &str,
        lexical_index: &LexicalIndex,
        chunks: &[ChunkBody],
    ) -> Result<(), RagError> {
        let mut uploads: Vec<(ObjectPath, Bytes)> = Vec::with_capacity(chunks.len() + 3);

        uploads.push((
            Self::original_path(uuid),
            Bytes::copy_from_slice(original_bytes),
        ));
        uploads.push((
            Self::extracted_path(uuid),
            Bytes::from(extracted_text.as_bytes().to_vec()),
        ));

        let index_json = serde_json::to_vec(lexical_index)?;
        uploads.push((Self::bm25_index_path(uuid), Bytes::from(index_json)));

        for chunk in chunks {
            let json = serde_json::to_vec(chunk)?;
            uploads.push((Self::chunk_path(uuid, chunk.index), Bytes::from(json)));
        }

        let _ = original_mime;
        self.run_bounded_uploads(uploads).await
    }

    async fn run_bounded_uploads(&self, uploads: Vec<(ObjectPath, Bytes)>) -> Result<(), RagError> {
        let mut pending = FuturesUnordered::new();
        let mut iter = uploads.into_iter();
        let mut in_flight = 0usize;

        for (path, bytes) in iter.by_ref() {
            if in_flight >= self.concurrency {
                break;
            }
            pending.push(self.put(path, bytes));
            in_flight += 1;
        }

        let mut remaining: Vec<(ObjectPath, Bytes)> = iter.collect();

        while let Some(result) = pending.next().await {
            result?;
            if let Some((path, bytes)) = remaining.pop() {
                pending.push(self.put(path, bytes));
            }
        }

        Ok(())
    }

    async fn put(&self, path: ObjectPath, bytes: Bytes) -> Result<(), RagError> {
        self.store
            .put(&path, PutPayload::from(bytes))
            .await
            .map_err(|e| RagError::BlobWriteFailure {
                uuid: path.to_string(),
                source: e,
            })?;
        Ok(())
    }

    async fn get(&self, path: ObjectPath) -> Result<Bytes, RagError> {
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| RagError::BlobReadFailure {
                key: path.to_string(),
                source: e,
            })?;
        result
            .bytes()
            .await
            .map_err(|e| RagError::BlobReadFailure {
                key: path.to_string(),
                source: e,
            })
    }

    pub async fn fetch_extracted_text(&self, uuid: Uuid) -> Result<String, RagError> {
        let bytes = self.get(Self::extracted_path(uuid)).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| RagError::Internal(anyhow::anyhow!("extracted text is not UTF-8: {e}")))
    }

    pub async fn fetch_original(&self, uuid: Uuid) -> Result<Bytes, RagError> {
        self.get(Self::original_path(uuid)).await
    }

    pub async fn fetch_bm25_index(&self, uuid: Uuid) -> Result<LexicalIndex, RagError> {
        let bytes = self.get(Self::bm25_index_path(uuid)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch chunk bodies (text only) for the given indices, preserving the
    /// requested order.
    pub async fn fetch_chunks(&self, uuid: Uuid, indices: &[usize]) -> Result<Vec<String>, RagError> {
        let bodies = self.fetch_chunks_with_metadata(uuid, indices).await?;
        Ok(bodies.into_iter().map(|b| b.text).collect())
    }

    /// Fetch full chunk bodies (text + char-span metadata) for the given
    /// indices, bounded by the concurrency cap, preserving requested order.
    pub async fn fetch_chunks_with_metadata(
        &self,
        uuid: Uuid,
        indices: &[usize],
    ) -> Result<Vec<ChunkBody>, RagError> {
        let mut pending = FuturesUnordered::new();
        let mut iter = indices.iter().copied().enumerate();
        let mut in_flight = 0usize;

        for (position, index) in iter.by_ref() {
            if in_flight >= self.concurrency {
                break;
            }
            pending.push(self.fetch_one_chunk(uuid, position, index));
            in_flight += 1;
        }

        let mut remaining: Vec<(usize, usize)> = iter.collect();
        let mut results: Vec<Option<ChunkBody>> = vec![None; indices.len()];

        while let Some(result) = pending.next().await {
            let upload = result?;
            results[upload.index] = Some(upload.body);
            if let Some((position, index)) = remaining.pop() {
                pending.push(self.fetch_one_chunk(uuid, position, index));
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                body.ok_or_else(|| {
                    RagError::Internal(anyhow::anyhow!("chunk fetch missing result at position {i}"))
                })
            })
            .collect()
    }

    async fn fetch_one_chunk(&self, uuid: Uuid, position: usize, index: usize) -> Result<ChunkUpload, RagError> {
        let bytes = self.get(Self::chunk_path(uuid, index)).await?;
        let body: ChunkBody = serde_json::from_slice(&bytes)?;
        Ok(ChunkUpload { index: position, body })
    }

    /// Delete every object under a document's UUID prefix. Best-effort:
    /// individual failures are collected and surfaced, but do not stop the
    /// rest of the batch from being attempted.
    pub async fn delete_document(&self, uuid: Uuid) -> Result<(), RagError> {
        let prefix = ObjectPath::from(format!("{uuid}/"));
        let mut listing = self.store.list(Some(&prefix));

        let mut paths = Vec::new();
        while let Some(meta) = listing.next().await {
            match meta {
                Ok(meta) => paths.push(meta.location),
                Err(e) => return Err(RagError::BlobReadFailure {
                    key: prefix.to_string(),
                    source: e,
                }),
            }
        }

        let mut errors = Vec::new();
        let mut pending = FuturesUnordered::new();
        let mut iter = paths.into_iter();
        let mut in_flight = 0usize;

        for path in iter.by_ref() {
            if in_flight >= self.concurrency {
                break;
            }
            pending.push(self.delete_one(path));
            in_flight += 1;
        }
        let mut remaining: Vec<ObjectPath> = iter.collect();

        while let Some(result) = pending.next().await {
            if let Err(e) = result {
                errors.push(e);
            }
            if let Some(path) = remaining.pop() {
                pending.push(self.delete_one(path));
            }
        }

        if !errors.is_empty() {
            tracing::warn!(%uuid, failed = errors.len(), "some objects failed to delete");
            return Err(RagError::Internal(anyhow::anyhow!(
                "{} objects failed to delete for document {uuid}",
                errors.len()
            )));
        }
        Ok(())
    }

    async fn delete_one(&self, path: ObjectPath) -> Result<(), RagError> {
        self.store
            .delete(&path)
            .await
            .map_err(|e| RagError::BlobWriteFailure {
                uuid: path.to_string(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkBodyMetadata;
    use object_store::memory::InMemory;

    fn store() -> BlobStore {
        BlobStore::new(Arc::new(InMemory::new()), 4)
    }

    #[tokio::test]
    async fn round_trips_extracted_text_and_original_bytes() {
        let blob_store = store();
        let uuid = Uuid::new_v4();
        let chunk = ChunkBody {
            text: "hello".to_string(),
            index: 0,
            metadata: ChunkBodyMetadata { start_char: 0, end_char: 5 },
        };
        let lexical_index = LexicalIndex::default();

        blob_store
            .upload_document(uuid, b"raw bytes", "application/pdf", "hello", &lexical_index, &[chunk])
            .await
            .unwrap();

        assert_eq!(blob_store.fetch_extracted_text(uuid).await.unwrap(), "hello");
        assert_eq!(blob_store.fetch_original(uuid).await.unwrap().as_ref(), b"raw bytes");
    }

    #[tokio::test]
    async fn fetch_chunks_preserves_requested_order() {
        let blob_store = store();
        let uuid = Uuid::new_v4();
        let chunks: Vec<ChunkBody> = (0..5)
            .map(|i| ChunkBody {
                text: format!("chunk-{i}"),
                index: i,
                metadata: ChunkBodyMetadata::default(),
            })
            .collect();
        let lexical_index = LexicalIndex::default();

        blob_store
            .upload_document(uuid, b"raw", "text/plain", "text", &lexical_index, &chunks)
            .await
            .unwrap();

        let fetched = blob_store.fetch_chunks(uuid, &[3, 0, 4]).await.unwrap();
        assert_eq!(fetched, vec!["chunk-3", "chunk-0", "chunk-4"]);
    }

    #[tokio::test]
    async fn missing_chunk_is_an_error() {
        let blob_store = store();
        let uuid = Uuid::new_v4();
        assert!(blob_store.fetch_chunks(uuid, &[0]).await.is_err());
    }

    #[tokio::test]
    async fn delete_document_removes_all_objects() {
        let blob_store = store();
        let uuid = Uuid::new_v4();
        let chunk = ChunkBody {
            text: "x".to_string(),
            index: 0,
            metadata: ChunkBodyMetadata::default(),
        };
        blob_store
            .upload_document(uuid, b"raw", "text/plain", "x", &LexicalIndex::default(), &[chunk])
            .await
            .unwrap();

        blob_store.delete_document(uuid).await.unwrap();
        assert!(blob_store.fetch_extracted_text(uuid).await.is_err());
    }
}
