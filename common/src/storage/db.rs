use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    /// Connect, sign in as root, and select the configured namespace/database.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Idempotent schema bootstrap: the uniqueness constraints named in the
    /// canonical schema (§6). Does not touch the HNSW vector indexes — those
    /// are dimension-dependent and are the Model Governor's concern via
    /// `storage::indexes::ensure_runtime_indexes`.
    pub async fn apply_migrations(&self) -> Result<(), AppError> {
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS unique_document_source_model ON TABLE documents FIELDS source, embedding_model UNIQUE;
                 DEFINE INDEX IF NOT EXISTS unique_entity_name_type ON TABLE entities FIELDS name, entity_type UNIQUE;
                 DEFINE INDEX IF NOT EXISTS unique_relationship_triple ON TABLE relationships FIELDS source_entity_id, target_entity_id, relationship_type UNIQUE;
                 DEFINE INDEX IF NOT EXISTS unique_entity_mention ON TABLE entity_mentions FIELDS entity_id, chunk_id UNIQUE;
                 DEFINE INDEX IF NOT EXISTS unique_relationship_mention ON TABLE relationship_mentions FIELDS relationship_id, chunk_id UNIQUE;
                 DEFINE INDEX IF NOT EXISTS unique_entity_embedding ON TABLE entity_embeddings FIELDS entity_id, embedding_model UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_chunks_document ON TABLE chunks FIELDS document_id;
                 DEFINE INDEX IF NOT EXISTS idx_mentions_chunk ON TABLE entity_mentions FIELDS chunk_id;
                 DEFINE INDEX IF NOT EXISTS idx_relationship_mentions_chunk ON TABLE relationship_mentions FIELDS chunk_id;
                 DEFINE INDEX IF NOT EXISTS idx_task_status ON TABLE ingestion_tasks FIELDS status;",
            )
            .await?
            .check()?;

        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Store an object, requires the struct to implement `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Retrieve all objects from a table, requires the struct to implement `StoredObject`.
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Retrieve a single object by its id, requires the struct to implement `StoredObject`.
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Delete a single object by its id, requires the struct to implement `StoredObject`.
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Listen to a table for live updates, requires the struct to implement `StoredObject`.
    pub async fn listen<T>(&self) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string(); // ensures isolation per test run
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.apply_migrations().await.expect("Failed to apply migrations");

        // Test basic CRUD
        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn apply_migrations_is_idempotent() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.apply_migrations().await.expect("first migration");
        db.apply_migrations().await.expect("second migration should be a no-op");
    }
}
