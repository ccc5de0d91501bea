use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Chunk, "chunks", {
    document_id: String,
    chunk_index: i64,
    page: Option<i64>,
    content: String
});

impl Chunk {
    pub fn new(document_id: String, chunk_index: i64, page: Option<i64>, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            chunk_index,
            page,
            content,
        }
    }

    /// Chunks of a document, totally ordered by ordinal index (I6).
    pub async fn of_document(db: &SurrealDbClient, document_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM chunks WHERE document_id = $doc_id ORDER BY chunk_index ASC")
            .bind(("doc_id", document_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get(db: &SurrealDbClient, chunk_id: &str) -> Result<Option<Self>, AppError> {
        Ok(db.get_item(chunk_id).await?)
    }

    pub async fn get_many(db: &SurrealDbClient, chunk_ids: &[String]) -> Result<Vec<Self>, AppError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<String> = chunk_ids.to_vec();
        let mut response = db
            .client
            .query("SELECT * FROM chunks WHERE id IN $ids")
            .bind(("ids", things))
            .await?;
        Ok(response.take(0)?)
    }

    /// Deletes every chunk belonging to `document_id` and returns the deleted
    /// ids, so callers can cascade vector/mention cleanup (chunks exclusively
    /// own ChunkVectors and Mentions).
    pub async fn delete_of_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let existing = Self::of_document(db, document_id).await?;
        let ids: Vec<String> = existing.into_iter().map(|c| c.id).collect();
        if ids.is_empty() {
            return Ok(ids);
        }
        db.client
            .query("DELETE chunks WHERE document_id = $doc_id")
            .bind(("doc_id", document_id.to_string()))
            .await?;
        Ok(ids)
    }

    /// Bounded candidate set for keyword search (§4.3 step 3): chunks whose
    /// lowercased content contains any of the given tokens, capped to `limit`.
    pub async fn keyword_candidates(
        db: &SurrealDbClient,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<(String, String)>, AppError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut response = db
            .client
            .query("SELECT id, content FROM chunks WHERE string::lowercase(content) CONTAINSANY $tokens LIMIT $limit")
            .bind(("tokens", tokens.to_vec()))
            .bind(("limit", limit as i64))
            .await?;
        let rows: Vec<ChunkContentRow> = response.take(0)?;
        Ok(rows.into_iter().map(|r| (r.id, r.content)).collect())
    }
}

#[derive(serde::Deserialize)]
struct ChunkContentRow {
    #[serde(deserialize_with = "crate::storage::types::document::deserialize_flexible_id")]
    id: String,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::document::Document;

    #[tokio::test]
    async fn ordering_and_deletion_roundtrip() {
        let db = SurrealDbClient::memory("chunks_ns", "chunks_db").await.expect("mem db");
        let (doc, _) = Document::insert_or_get(&db, "/a.txt", "model-a").await.expect("doc");

        for i in 0..3 {
            db.store_item(Chunk::new(doc.id.clone(), i, None, format!("chunk {i}")))
                .await
                .expect("store chunk");
        }

        let chunks = Chunk::of_document(&db, &doc.id).await.expect("load chunks");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[2].chunk_index, 2);

        let deleted_ids = Chunk::delete_of_document(&db, &doc.id).await.expect("delete");
        assert_eq!(deleted_ids.len(), 3);
        assert!(Chunk::of_document(&db, &doc.id).await.expect("reload").is_empty());
    }
}
