//! Chunk Store (§4.1): the transactional structured-store operations over
//! Documents and Chunks. Graph tables share the same connection but are
//! addressed through `storage::graph_store`; this module owns only the
//! operations named in §4.1's contract.

use crate::{
    error::AppError,
    storage::db::SurrealDbClient,
    storage::graph_store,
    storage::types::{chunk::Chunk, chunk_vector::ChunkVector, document::Document},
    utils::keyword,
};

pub struct NewChunk {
    pub page: Option<i64>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub source: String,
    pub models: Vec<String>,
}

/// `insert_document(source, model) -> (doc_id, existed)` (§4.1 contract).
pub async fn insert_document(db: &SurrealDbClient, source: &str, model: &str) -> Result<(Document, bool), AppError> {
    Document::insert_or_get(db, source, model).await
}

/// Replace a document's chunks wholesale: delete old chunks, their vectors,
/// and their mentions, then insert the new set. Caller commits the
/// embeddings in a following step (§4.7 steps 4-6); this function only
/// performs the structured-store half of the atomic write.
pub async fn replace_chunks_of(db: &SurrealDbClient, document_id: &str, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>, AppError> {
    let old_chunk_ids = Chunk::delete_of_document(db, document_id).await?;
    if !old_chunk_ids.is_empty() {
        ChunkVector::delete_many(db, &old_chunk_ids).await?;
        graph_store::delete_mentions_for_chunks(db, &old_chunk_ids).await?;
    }

    let mut stored = Vec::with_capacity(chunks.len());
    for (index, new_chunk) in chunks.into_iter().enumerate() {
        let chunk = Chunk::new(document_id.to_string(), index as i64, new_chunk.page, new_chunk.content);
        let inserted = db
            .store_item(chunk)
            .await?
            .ok_or_else(|| AppError::InternalStorageError("failed to insert chunk".into()))?;
        stored.push(inserted);
    }

    Ok(stored)
}

pub async fn get_chunks(db: &SurrealDbClient, document_id: &str) -> Result<Vec<Chunk>, AppError> {
    Chunk::of_document(db, document_id).await
}

pub async fn get_chunk(db: &SurrealDbClient, chunk_id: &str) -> Result<Option<Chunk>, AppError> {
    Chunk::get(db, chunk_id).await
}

/// `delete_document(source)` (§4.1): removes every Document row matching
/// `source` across embedding models, cascading chunks, vectors, and
/// mentions, then leaves the Graph Store orphan-free (I4).
pub async fn delete_document(db: &SurrealDbClient, source: &str) -> Result<(), AppError> {
    let documents = Document::find_by_source_any_model(db, source).await?;
    for document in documents {
        let chunk_ids = Chunk::delete_of_document(db, &document.id).await?;
        if !chunk_ids.is_empty() {
            ChunkVector::delete_many(db, &chunk_ids).await?;
            graph_store::delete_mentions_for_chunks(db, &chunk_ids).await?;
        }
        db.delete_item::<Document>(&document.id).await?;
    }
    graph_store::cleanup_orphans(db).await?;
    Ok(())
}

/// `keyword_search(query, k)` (§4.1/§4.3): a bounded SurrealDB candidate
/// query feeding the literal Rust-side scoring algorithm.
pub async fn keyword_search(db: &SurrealDbClient, query: &str, k: usize) -> Result<Vec<keyword::KeywordHit>, AppError> {
    const LIMIT_MULTIPLIER: usize = 3;
    let tokens = keyword::tokenize_query(query);
    if tokens.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let candidates = Chunk::keyword_candidates(db, &tokens, k * LIMIT_MULTIPLIER).await?;
    Ok(keyword::search(&candidates, query, k))
}

/// `list_sources() -> [{source, models[]}]` (§6).
pub async fn list_sources(db: &SurrealDbClient) -> Result<Vec<SourceSummary>, AppError> {
    let documents = Document::list_all(db).await?;
    let mut by_source: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for document in documents {
        let models = by_source.entry(document.source).or_default();
        if !models.contains(&document.embedding_model) {
            models.push(document.embedding_model);
        }
    }
    Ok(by_source
        .into_iter()
        .map(|(source, models)| SourceSummary { source, models })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn mem_db(label: &str) -> SurrealDbClient {
        let db = SurrealDbClient::memory("chunk_store_ns", &format!("{label}_{}", Uuid::new_v4()))
            .await
            .expect("mem db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn replace_chunks_of_clears_previous_chunks_and_vectors() {
        let db = mem_db("replace").await;
        let (document, _existed) = insert_document(&db, "/a.txt", "model-a").await.expect("doc");

        let first = replace_chunks_of(
            &db,
            &document.id,
            vec![
                NewChunk { page: None, content: "one".into() },
                NewChunk { page: None, content: "two".into() },
            ],
        )
        .await
        .expect("first chunks");
        assert_eq!(first.len(), 2);

        for chunk in &first {
            ChunkVector::upsert(&db, ChunkVector::new(chunk.id.clone(), vec![0.1, 0.2], "model-a".into()))
                .await
                .expect("vector");
        }

        let second = replace_chunks_of(&db, &document.id, vec![NewChunk { page: None, content: "only one now".into() }])
            .await
            .expect("second chunks");
        assert_eq!(second.len(), 1);

        let remaining_vectors: Vec<ChunkVector> = db.get_all_stored_items().await.expect("vectors");
        assert_eq!(remaining_vectors.len(), 1);
        assert_eq!(remaining_vectors[0].chunk_id, second[0].id);
    }

    #[tokio::test]
    async fn delete_document_removes_all_models_and_cleans_orphans() {
        let db = mem_db("delete").await;
        let (doc_a, _) = insert_document(&db, "/a.txt", "model-a").await.expect("doc a");
        let (doc_b, _) = insert_document(&db, "/a.txt", "model-b").await.expect("doc b");
        replace_chunks_of(&db, &doc_a.id, vec![NewChunk { page: None, content: "hello".into() }])
            .await
            .expect("chunks a");
        replace_chunks_of(&db, &doc_b.id, vec![NewChunk { page: None, content: "hello".into() }])
            .await
            .expect("chunks b");

        delete_document(&db, "/a.txt").await.expect("delete");

        let sources = list_sources(&db).await.expect("sources");
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn keyword_search_finds_inserted_chunk_text() {
        let db = mem_db("keyword").await;
        let (document, _) = insert_document(&db, "/fox.txt", "model-a").await.expect("doc");
        replace_chunks_of(
            &db,
            &document.id,
            vec![NewChunk { page: Some(2), content: "The quick brown fox jumps over the lazy dog.".into() }],
        )
        .await
        .expect("chunks");

        let hits = keyword_search(&db, "quick brown fox", 5).await.expect("search");
        assert_eq!(hits.len(), 1);
    }
}
