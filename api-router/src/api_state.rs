use std::sync::Arc;

use common::{
    error::AppError,
    governor::ModelGovernor,
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider, generation::GenerationProvider},
};
use ingestion_pipeline::worker::GraphBuildRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub embedder: EmbeddingProvider,
    pub generator: GenerationProvider,
    pub governor: Arc<ModelGovernor>,
    /// Shared with the background worker so `graph_progress` (§6) can see
    /// a build running on the worker side of the process.
    pub graph_registry: Arc<GraphBuildRegistry>,
}

impl ApiState {
    pub async fn new(
        config: &AppConfig,
        embedder: EmbeddingProvider,
        generator: GenerationProvider,
        graph_registry: Arc<GraphBuildRegistry>,
    ) -> Result<Self, AppError> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        db.apply_migrations().await?;

        let governor = Arc::new(ModelGovernor::new(db.clone()));
        governor.ensure_initialized(embedder.model_name(), embedder.dimension()).await?;

        Ok(Self { db, config: config.clone(), embedder, generator, governor, graph_registry })
    }
}
