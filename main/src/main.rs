//! Process wiring (EXP-1): config load, DB connection, index bootstrap,
//! HTTP server, and a background worker loop draining the ingestion task
//! queue, run side by side in a single process.

use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use common::{
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider, generation::GenerationProvider},
};
use graph_builder::Extractor;
use ingestion_pipeline::{pipeline::IngestPipeline, run_worker_loop, worker::GraphBuildRegistry, TaskProcessor};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let embedder = EmbeddingProvider::from_config(&config, None).await?;
    info!(
        embedding_backend = ?config.embedding_backend,
        embedding_dimension = embedder.dimension(),
        "embedding provider initialized"
    );
    let generator = GenerationProvider::from_config(&config);

    let graph_registry = Arc::new(GraphBuildRegistry::new());

    let api_state = ApiState::new(&config, embedder.clone(), generator.clone(), graph_registry.clone()).await?;

    let app = api_routes_v1::<ApiState>().with_state(api_state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&serve_address).await?;
    info!(address = %serve_address, "starting server");

    let server_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "server error");
        }
    });

    let worker_db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let ingest_pipeline = Arc::new(IngestPipeline::new(worker_db.clone(), embedder.clone(), &config));
    let extractor = Extractor::new(generator.clone(), config.extraction_model.clone());
    let processor = Arc::new(TaskProcessor::new(worker_db.clone(), ingest_pipeline, embedder, extractor, graph_registry));

    info!("starting worker loop");
    let worker_handle = tokio::spawn(run_worker_loop(worker_db, processor));

    tokio::select! {
        result = server_handle => {
            if let Err(err) = result {
                error!(%err, "server task panicked");
            }
        }
        result = worker_handle => {
            match result {
                Ok(Err(err)) => error!(%err, "worker loop exited with an error"),
                Err(err) => error!(%err, "worker task panicked"),
                Ok(Ok(())) => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::utils::{config::AppConfig, embedding::EmbeddingProvider, generation::GenerationProvider};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        AppConfig {
            surrealdb_address: "mem://".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            http_port: 0,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn liveness_and_readiness_probes_respond_ok() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let embedder = EmbeddingProvider::new_hashed(8);
        let generator = GenerationProvider::new(
            "https://example.invalid".to_string(),
            "test-key".to_string(),
            std::time::Duration::from_secs(1),
        );
        let graph_registry = Arc::new(GraphBuildRegistry::new());

        let api_state = ApiState::new(&config, embedder, generator, graph_registry)
            .await
            .expect("api state should build against an in-memory database");

        let app = api_routes_v1::<ApiState>().with_state(api_state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/live").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(ready_response.status(), StatusCode::OK);
    }
}
