use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Keyed 1:1 by entity id, mirroring `ChunkVector`: the Governor keeps entity
/// and chunk vectors in lockstep on the same active model (§9 open question 3),
/// so there is never more than one live row per entity.
stored_object!(EntityEmbedding, "entity_embeddings", {
    entity_id: String,
    embedding: Vec<f32>,
    embedding_model: String
});

impl EntityEmbedding {
    pub fn new(entity_id: String, embedding: Vec<f32>, embedding_model: String) -> Self {
        let now = Utc::now();
        Self {
            id: entity_id.clone(),
            created_at: now,
            updated_at: now,
            entity_id,
            embedding,
            embedding_model,
        }
    }

    pub async fn upsert(db: &SurrealDbClient, vector: Self) -> Result<Self, AppError> {
        let stored: Option<Self> = db
            .client
            .query("UPDATE type::thing('entity_embeddings', $id) CONTENT $content RETURN AFTER")
            .bind(("id", vector.id.clone()))
            .bind(("content", vector.clone()))
            .await?
            .take(0)?;
        stored.ok_or_else(|| AppError::InternalStorageError("failed to upsert entity vector".into()))
    }

    pub async fn entities_missing_vector_for_model(
        db: &SurrealDbClient,
        embedding_model: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT id FROM entities WHERE id NOT IN (\
                    SELECT VALUE entity_id FROM entity_embeddings WHERE embedding_model = $model\
                 )",
            )
            .bind(("model", embedding_model.to_string()))
            .await?;
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(deserialize_with = "crate::storage::types::document::deserialize_flexible_id")]
            id: String,
        }
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    pub async fn delete_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.drop_table::<Self>().await?;
        Ok(())
    }
}
