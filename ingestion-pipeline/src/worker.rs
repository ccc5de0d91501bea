//! The durable task queue side of EXP-3's worker/queue separation: claims
//! `IngestionTask` rows and dispatches them to either the Ingest Pipeline or
//! the Graph Builder depending on payload kind.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    storage::types::{
        ingestion_payload::IngestionPayload,
        ingestion_task::{IngestionTask, TaskErrorInfo},
    },
    utils::embedding::EmbeddingProvider,
};
use graph_builder::{builder::build_graph, CancellationFlag, Extractor, GraphProgress};
use tracing::{error, info};

use crate::pipeline::IngestPipeline;

/// Tracks in-flight graph builds so `graph_progress`/`cancel` (§6) can reach
/// a build that is running on the worker, keyed by source path.
#[derive(Default)]
pub struct GraphBuildRegistry {
    active: Mutex<HashMap<String, (CancellationFlag, GraphProgress)>>,
}

impl GraphBuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&self, source_path: &str) -> CancellationFlag {
        let flag = CancellationFlag::new();
        self.lock().insert(source_path.to_string(), (flag.clone(), GraphProgress::default()));
        flag
    }

    fn update(&self, source_path: &str, progress: GraphProgress) {
        if let Some(entry) = self.lock().get_mut(source_path) {
            entry.1 = progress;
        }
    }

    fn finish(&self, source_path: &str) {
        self.lock().remove(source_path);
    }

    pub fn progress(&self, source_path: &str) -> Option<GraphProgress> {
        self.lock().get(source_path).map(|(_, progress)| progress.clone())
    }

    pub fn cancel(&self, source_path: &str) -> bool {
        if let Some((flag, _)) = self.lock().get(source_path) {
            flag.cancel();
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (CancellationFlag, GraphProgress)>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct TaskProcessor {
    db: Arc<SurrealDbClient>,
    ingest_pipeline: Arc<IngestPipeline>,
    embedder: EmbeddingProvider,
    extractor: Extractor,
    registry: Arc<GraphBuildRegistry>,
}

impl TaskProcessor {
    pub fn new(
        db: Arc<SurrealDbClient>,
        ingest_pipeline: Arc<IngestPipeline>,
        embedder: EmbeddingProvider,
        extractor: Extractor,
        registry: Arc<GraphBuildRegistry>,
    ) -> Self {
        Self { db, ingest_pipeline, embedder, extractor, registry }
    }

    pub fn registry(&self) -> Arc<GraphBuildRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn process(&self, task: &IngestionTask) -> Result<(), AppError> {
        match &task.payload {
            IngestionPayload::Ingest { source_path } => {
                self.ingest_pipeline.ingest(source_path).await?;
                Ok(())
            }
            IngestionPayload::BuildGraph { source_path, .. } => self.run_build_graph(source_path).await,
        }
    }

    async fn run_build_graph(&self, source_path: &str) -> Result<(), AppError> {
        let cancel = self.registry.start(source_path);

        let report =
            build_graph(&self.db, source_path, &self.extractor, &self.embedder, &cancel, |progress| self.registry.update(source_path, progress))
                .await;

        self.registry.finish(source_path);
        report.map(|_| ())
    }
}

/// Maps an `AppError` to a stable machine-readable code for `last_error`
/// (`TaskErrorInfo::code`), so operators and retries can distinguish
/// transient service errors from permanent validation/ontology failures.
fn classify_error(err: &AppError) -> TaskErrorInfo {
    let code = match err {
        AppError::UnsupportedFormat(_) => "unsupported_format",
        AppError::InvalidPath(_) => "invalid_path",
        AppError::EmbeddingServiceError(_) => "embedding_service_error",
        AppError::DimensionMismatch { .. } => "dimension_mismatch",
        AppError::ExtractionParseFailure(_) => "extraction_parse_failure",
        AppError::OntologyViolation(_) => "ontology_violation",
        AppError::NotFound(_) => "not_found",
        AppError::ModelNotInstalled(_) => "model_not_installed",
        AppError::InternalStorageError(_) => "internal_storage_error",
        AppError::Validation(_) => "validation",
        AppError::Processing(_) => "processing",
        AppError::Database(_) => "database",
        AppError::OpenAI(_) => "openai",
        AppError::Io(_) => "io",
        AppError::Reqwest(_) => "reqwest",
        AppError::Anyhow(_) => "anyhow",
        AppError::Join(_) => "join",
    };
    TaskErrorInfo { code: code.to_string(), message: err.to_string() }
}

/// Single-claim worker loop: fetch the queue, take the oldest ready task,
/// process it to completion, then loop. Idle backoff when nothing is ready;
/// a short backoff after a queue-read failure itself (distinct from a
/// per-task failure, which is recorded on the task and never escalates).
pub async fn run_worker_loop(db: Arc<SurrealDbClient>, processor: Arc<TaskProcessor>) -> Result<(), AppError> {
    let idle_backoff = tokio::time::Duration::from_millis(500);
    let error_backoff = tokio::time::Duration::from_secs(1);

    loop {
        let queued = match IngestionTask::queued(&db).await {
            Ok(queued) => queued,
            Err(err) => {
                error!(%err, "failed to read ingestion task queue");
                tokio::time::sleep(error_backoff).await;
                continue;
            }
        };

        let Some(task) = queued.into_iter().next() else {
            tokio::time::sleep(idle_backoff).await;
            continue;
        };

        let task = match IngestionTask::mark_processing(&db, &task.id).await {
            Ok(task) => task,
            Err(err) => {
                error!(task_id = %task.id, %err, "failed to mark task processing");
                continue;
            }
        };

        info!(task_id = %task.id, attempts = task.attempts, "processing ingestion task");
        match processor.process(&task).await {
            Ok(()) => {
                if let Err(err) = IngestionTask::mark_succeeded(&db, &task.id).await {
                    error!(task_id = %task.id, %err, "failed to mark task succeeded");
                }
            }
            Err(err) => {
                let info = classify_error(&err);
                let result = if task.can_retry() && err.is_retryable() {
                    IngestionTask::mark_failed(&db, &task.id, info).await
                } else {
                    IngestionTask::mark_dead_letter(&db, &task.id, info).await
                };
                if let Err(mark_err) = result {
                    error!(task_id = %task.id, error = %mark_err, "failed to mark task outcome");
                }
                error!(task_id = %task.id, %err, "ingestion task failed");
            }
        }
    }
}
