use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Keyed 1:1 by chunk id rather than a fresh surrogate id: a chunk owns at
/// most one vector at a time (I3), so reusing the chunk id as the vector's id
/// makes "does this chunk have a vector" a point lookup.
stored_object!(ChunkVector, "chunk_vectors", {
    chunk_id: String,
    embedding: Vec<f32>,
    embedding_model: String
});

impl ChunkVector {
    pub fn new(chunk_id: String, embedding: Vec<f32>, embedding_model: String) -> Self {
        let now = Utc::now();
        Self {
            id: chunk_id.clone(),
            created_at: now,
            updated_at: now,
            chunk_id,
            embedding,
            embedding_model,
        }
    }

    pub async fn upsert(db: &SurrealDbClient, vector: Self) -> Result<Self, AppError> {
        let stored: Option<Self> = db
            .client
            .query("UPDATE type::thing('chunk_vectors', $id) CONTENT $content RETURN AFTER")
            .bind(("id", vector.id.clone()))
            .bind(("content", vector.clone()))
            .await?
            .take(0)?;
        stored.ok_or_else(|| AppError::InternalStorageError("failed to upsert chunk vector".into()))
    }

    pub async fn delete_many(db: &SurrealDbClient, chunk_ids: &[String]) -> Result<(), AppError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        db.client
            .query("DELETE chunk_vectors WHERE id IN $ids")
            .bind(("ids", chunk_ids.to_vec()))
            .await?;
        Ok(())
    }

    pub async fn distinct_embedding_models(db: &SurrealDbClient) -> Result<Vec<String>, AppError> {
        let mut response = db.client.query("SELECT VALUE embedding_model FROM chunk_vectors").await?;
        let models: Vec<String> = response.take(0)?;
        let mut distinct = Vec::new();
        for model in models {
            if !distinct.contains(&model) {
                distinct.push(model);
            }
        }
        Ok(distinct)
    }

    pub async fn delete_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.drop_table::<Self>().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_keyed_by_chunk_id() {
        let db = SurrealDbClient::memory("cv_ns", "cv_db").await.expect("mem db");
        let first = ChunkVector::new("chunk-1".into(), vec![0.1, 0.2], "model-a".into());
        ChunkVector::upsert(&db, first).await.expect("first upsert");

        let second = ChunkVector::new("chunk-1".into(), vec![0.3, 0.4], "model-a".into());
        let updated = ChunkVector::upsert(&db, second).await.expect("second upsert");
        assert_eq!(updated.embedding, vec![0.3, 0.4]);

        let all = db.get_all_stored_items::<ChunkVector>().await.expect("all");
        assert_eq!(all.len(), 1);
    }
}
