use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Document, "documents", {
    source: String,
    embedding_model: String
});

impl Document {
    pub fn new(source: String, embedding_model: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source,
            embedding_model,
        }
    }

    pub async fn find_by_source_and_model(
        db: &SurrealDbClient,
        source: &str,
        embedding_model: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM documents WHERE source = $source AND embedding_model = $model LIMIT 1")
            .bind(("source", source.to_string()))
            .bind(("model", embedding_model.to_string()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Idempotent on `(source, embedding_model)` (I5): returns the existing row
    /// and `existed = true` when a document already maps this pair, otherwise
    /// creates and returns a fresh one.
    pub async fn insert_or_get(
        db: &SurrealDbClient,
        source: &str,
        embedding_model: &str,
    ) -> Result<(Self, bool), AppError> {
        if let Some(existing) = Self::find_by_source_and_model(db, source, embedding_model).await? {
            return Ok((existing, true));
        }

        let document = Self::new(source.to_string(), embedding_model.to_string());
        let stored = db
            .store_item(document.clone())
            .await?
            .ok_or_else(|| AppError::InternalStorageError("failed to insert document".into()))?;
        Ok((stored, false))
    }

    pub async fn find_by_source_any_model(
        db: &SurrealDbClient,
        source: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM documents WHERE source = $source")
            .bind(("source", source.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn list_all(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        Ok(db.get_all_stored_items::<Self>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_or_get_is_idempotent_per_source_and_model() {
        let db = SurrealDbClient::memory("docs_ns", "docs_db").await.expect("mem db");

        let (first, existed_first) = Document::insert_or_get(&db, "/a.pdf", "model-a")
            .await
            .expect("first insert");
        assert!(!existed_first);

        let (second, existed_second) = Document::insert_or_get(&db, "/a.pdf", "model-a")
            .await
            .expect("second insert");
        assert!(existed_second);
        assert_eq!(first.id, second.id);

        let (third, existed_third) = Document::insert_or_get(&db, "/a.pdf", "model-b")
            .await
            .expect("third insert");
        assert!(!existed_third);
        assert_ne!(first.id, third.id);
    }
}
