//! Model Governor (§4.10): the single source of truth for which embedding
//! model is active. No other component may cache the model name (§9); they
//! either query `ModelGovernor::current` or receive the name as an explicit
//! parameter at an operation boundary.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        indexes,
        types::{
            chunk::Chunk, chunk_vector::ChunkVector, document::Document, entity_embedding::EntityEmbedding,
            entity_mention::EntityMention, model_state::ModelState, relationship_mention::RelationshipMention,
        },
    },
    storage::graph_store,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SetResult {
    /// The normalized requested name matches the currently active model;
    /// no state was touched.
    Unchanged,
    /// `force == false` and existing vectors belong to a different model;
    /// the caller must re-invoke with `force = true` to proceed.
    ConfirmationRequired { existing_models: Vec<String>, new_model: String },
    /// The switch (or first-time initialization) completed.
    Ok,
}

pub struct ModelGovernor {
    db: Arc<SurrealDbClient>,
}

/// Strip a trailing `:latest` tag before comparing model names (§4.10 step 1).
fn normalize_model_name(name: &str) -> &str {
    name.strip_suffix(":latest").unwrap_or(name)
}

impl ModelGovernor {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub async fn current(&self) -> Result<Option<ModelState>, AppError> {
        ModelState::get_current(&self.db).await
    }

    /// First-run bootstrap: if no model is recorded yet, adopt `model` at
    /// `dimension` without going through the confirmation dance (there is
    /// nothing to confirm against).
    #[instrument(skip(self))]
    pub async fn ensure_initialized(&self, model: &str, dimension: usize) -> Result<ModelState, AppError> {
        if let Some(existing) = self.current().await? {
            return Ok(existing);
        }
        let state = ModelState::set_current(&self.db, model.to_string(), dimension as u32).await?;
        indexes::ensure_runtime_indexes(&self.db, dimension).await?;
        Ok(state)
    }

    /// `set(name, force)` (§4.10).
    #[instrument(skip(self), fields(model = name, force))]
    pub async fn set(&self, name: &str, dimension: usize, force: bool) -> Result<SetResult, AppError> {
        let normalized_new = normalize_model_name(name);

        if let Some(current) = self.current().await? {
            if normalize_model_name(&current.active_model) == normalized_new {
                return Ok(SetResult::Unchanged);
            }
        }

        if !force {
            let existing_models = ChunkVector::distinct_embedding_models(&self.db).await?;
            if !existing_models.is_empty() && !existing_models.iter().any(|m| normalize_model_name(m) == normalized_new) {
                return Ok(SetResult::ConfirmationRequired {
                    existing_models,
                    new_model: name.to_string(),
                });
            }
        }

        self.run_destructive_cascade(name, dimension).await?;
        Ok(SetResult::Ok)
    }

    /// Step 3 of the switch protocol: delete both vector indices, delete
    /// every Chunk/Document row (and thereby every Mention, since chunks
    /// exclusively own Mentions — I2), reset the Graph Store to an
    /// orphan-free state, then record the new active model. Idempotent on
    /// retry (§7 propagation policy): each sub-step is itself a drop/delete
    /// that is a no-op when already empty.
    #[instrument(skip(self))]
    async fn run_destructive_cascade(&self, name: &str, dimension: usize) -> Result<(), AppError> {
        warn!(model = name, "model switch: running destructive cascade over all vector and graph state");

        ChunkVector::delete_all(&self.db).await?;
        EntityEmbedding::delete_all(&self.db).await?;
        self.db.drop_table::<Chunk>().await?;
        self.db.drop_table::<Document>().await?;
        self.db.drop_table::<EntityMention>().await?;
        self.db.drop_table::<RelationshipMention>().await?;
        graph_store::cleanup_orphans(&self.db).await?;

        ModelState::set_current(&self.db, name.to_string(), dimension as u32).await?;
        indexes::ensure_runtime_indexes(&self.db, dimension).await?;

        info!(model = name, dimension, "model switch complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::chunk_store;
    use uuid::Uuid;

    async fn governor(label: &str) -> (ModelGovernor, Arc<SurrealDbClient>) {
        let db = Arc::new(
            SurrealDbClient::memory("governor_ns", &format!("{label}_{}", Uuid::new_v4()))
                .await
                .expect("mem db"),
        );
        db.apply_migrations().await.expect("migrations");
        (ModelGovernor::new(db.clone()), db)
    }

    #[tokio::test]
    async fn ensure_initialized_adopts_first_model_without_confirmation() {
        let (governor, _db) = governor("init").await;
        let state = governor.ensure_initialized("text-embedding-3-small", 1536).await.expect("init");
        assert_eq!(state.active_model, "text-embedding-3-small");
    }

    #[tokio::test]
    async fn set_is_unchanged_when_normalized_names_match() {
        let (governor, _db) = governor("unchanged").await;
        governor.ensure_initialized("llama3", 4096).await.expect("init");
        let result = governor.set("llama3:latest", 4096, false).await.expect("set");
        assert_eq!(result, SetResult::Unchanged);
    }

    #[tokio::test]
    async fn set_requires_confirmation_when_vectors_exist_for_another_model() {
        let (governor, db) = governor("confirm").await;
        governor.ensure_initialized("model-a", 4).await.expect("init");
        ChunkVector::upsert(&db, ChunkVector::new("chunk-1".into(), vec![0.0; 4], "model-a".into()))
            .await
            .expect("vector");

        let result = governor.set("model-b", 8, false).await.expect("set");
        assert_eq!(
            result,
            SetResult::ConfirmationRequired { existing_models: vec!["model-a".to_string()], new_model: "model-b".to_string() }
        );
    }

    #[tokio::test]
    async fn forced_switch_clears_all_documents_and_vectors() {
        let (governor, db) = governor("cascade").await;
        governor.ensure_initialized("model-a", 4).await.expect("init");

        let (document, _) = chunk_store::insert_document(&db, "/a.txt", "model-a").await.expect("doc");
        chunk_store::replace_chunks_of(&db, &document.id, vec![chunk_store::NewChunk { page: None, content: "hello".into() }])
            .await
            .expect("chunks");

        let result = governor.set("model-b", 8, true).await.expect("set");
        assert_eq!(result, SetResult::Ok);

        let sources = chunk_store::list_sources(&db).await.expect("sources");
        assert!(sources.is_empty());

        let current = governor.current().await.expect("current").expect("some");
        assert_eq!(current.active_model, "model-b");
    }
}
