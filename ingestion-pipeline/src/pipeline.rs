//! Ingest Pipeline (§4.7): the latency-sensitive document-to-chunks-to-
//! vectors path. Graph building is deliberately not wired in here; it runs
//! later, driven by `graph-builder`, off the same queued task payload.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        chunk_store::{self, NewChunk},
        db::SurrealDbClient,
        vector_index::ChunkVectorIndex,
    },
    utils::{chunking, config::AppConfig, embedding::EmbeddingProvider},
};
use tracing::{info, instrument, warn};

use crate::extraction::{extract_pages, resolve_media_type};

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document_id: String,
    pub source: String,
    pub existed: bool,
    pub chunk_count: usize,
}

pub struct IngestPipeline {
    db: Arc<SurrealDbClient>,
    embedder: EmbeddingProvider,
    chunk_size_chars: usize,
    chunk_overlap_chars: usize,
}

impl IngestPipeline {
    pub fn new(db: Arc<SurrealDbClient>, embedder: EmbeddingProvider, config: &AppConfig) -> Self {
        Self { db, embedder, chunk_size_chars: config.chunk_size_chars, chunk_overlap_chars: config.chunk_overlap_chars }
    }

    /// `ingest(source_path) -> IngestReport` (§4.7).
    #[instrument(skip(self), fields(source_path))]
    pub async fn ingest(&self, source_path: &str) -> Result<IngestReport, AppError> {
        let media_type = resolve_media_type(source_path)?;
        let pages = extract_pages(source_path, media_type).await?;

        let raw_chunks = chunking::split_pages(&pages, self.chunk_size_chars, self.chunk_overlap_chars);
        if raw_chunks.is_empty() {
            warn!(source_path, "document produced no chunks");
        }

        let (document, existed) = chunk_store::insert_document(&self.db, source_path, self.embedder.model_name()).await?;

        let new_chunks: Vec<NewChunk> = raw_chunks.iter().map(|c| NewChunk { page: c.page, content: c.content.clone() }).collect();
        let stored_chunks = chunk_store::replace_chunks_of(&self.db, &document.id, new_chunks).await?;

        if let Err(embed_err) = self.embed_and_index(&stored_chunks, raw_chunks.iter().map(|c| c.content.as_str()).collect()).await {
            self.roll_back(&document.id, existed, &stored_chunks).await;
            return Err(embed_err);
        }

        info!(document_id = %document.id, chunk_count = stored_chunks.len(), existed, "ingest complete");
        Ok(IngestReport { document_id: document.id, source: document.source, existed, chunk_count: stored_chunks.len() })
    }

    /// §4.7 steps 5-6: batched embed, then upsert + `save()`.
    async fn embed_and_index(&self, chunks: &[common::storage::types::chunk::Chunk], contents: Vec<&str>) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = contents.into_iter().map(str::to_string).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let index = ChunkVectorIndex::new(&self.db, self.embedder.dimension());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            index.upsert(&chunk.id, vector, self.embedder.model_name()).await?;
        }
        index.save();
        Ok(())
    }

    /// §4.7 step 5 failure path: undo the structured-store write from step 4.
    /// A brand-new document row is removed outright; a pre-existing one (this
    /// was a re-ingest) is left in place since deleting it would destroy
    /// history unrelated to this attempt — its chunks are already gone.
    async fn roll_back(&self, document_id: &str, existed: bool, stored_chunks: &[common::storage::types::chunk::Chunk]) {
        let chunk_ids: Vec<String> = stored_chunks.iter().map(|c| c.id.clone()).collect();
        if let Err(err) = chunk_store::replace_chunks_of(&self.db, document_id, Vec::new()).await {
            warn!(document_id, %err, "failed to roll back chunks after embedding failure");
        }
        let index = ChunkVectorIndex::new(&self.db, self.embedder.dimension());
        if let Err(err) = index.delete(&chunk_ids).await {
            warn!(document_id, %err, "failed to roll back chunk vectors after embedding failure");
        }
        if !existed {
            if let Err(err) = self.db.delete_item::<common::storage::types::document::Document>(document_id).await {
                warn!(document_id, %err, "failed to roll back partial document row");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk_vector::ChunkVector;
    use uuid::Uuid;

    async fn mem_db(label: &str) -> Arc<SurrealDbClient> {
        let db = SurrealDbClient::memory("ingest_ns", &format!("{label}_{}", Uuid::new_v4())).await.expect("mem db");
        db.apply_migrations().await.expect("migrations");
        Arc::new(db)
    }

    #[tokio::test]
    async fn ingest_plain_text_file_produces_chunks_and_vectors() {
        let dir = tempfile_dir();
        let path = dir.join("doc.txt");
        tokio::fs::write(&path, "The quick brown fox jumps over the lazy dog. ".repeat(40)).await.expect("write");

        let db = mem_db("txt").await;
        let embedder = EmbeddingProvider::new_hashed(8);
        let config = AppConfig::default();
        let pipeline = IngestPipeline::new(db.clone(), embedder, &config);

        let report = pipeline.ingest(path.to_str().expect("utf8 path")).await.expect("ingest");
        assert!(!report.existed);
        assert!(report.chunk_count > 0);

        let vectors: Vec<ChunkVector> = db.get_all_stored_items().await.expect("vectors");
        assert_eq!(vectors.len(), report.chunk_count);
    }

    #[tokio::test]
    async fn reingest_replaces_previous_chunks() {
        let dir = tempfile_dir();
        let path = dir.join("doc.txt");
        tokio::fs::write(&path, "first version").await.expect("write");

        let db = mem_db("reingest").await;
        let embedder = EmbeddingProvider::new_hashed(8);
        let config = AppConfig::default();
        let pipeline = IngestPipeline::new(db.clone(), embedder, &config);

        let first = pipeline.ingest(path.to_str().expect("utf8 path")).await.expect("first ingest");
        tokio::fs::write(&path, "a very different second version of the document").await.expect("rewrite");
        let second = pipeline.ingest(path.to_str().expect("utf8 path")).await.expect("second ingest");

        assert!(second.existed);
        assert_eq!(first.document_id, second.document_id);

        let chunks = chunk_store::get_chunks(&db, &second.document_id).await.expect("chunks");
        assert_eq!(chunks.len(), second.chunk_count);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_before_any_write() {
        let db = mem_db("unsupported").await;
        let embedder = EmbeddingProvider::new_hashed(8);
        let config = AppConfig::default();
        let pipeline = IngestPipeline::new(db.clone(), embedder, &config);

        let err = pipeline.ingest("/tmp/does-not-matter.docx").await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ingest-pipeline-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }
}
