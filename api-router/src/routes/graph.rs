//! `build_graph(source, extraction_model, on_progress)` and
//! `graph_progress(source) -> {total_chunks, processed_chunks, percentage}`
//! (§6). The build itself runs on the worker side of the process (EXP-3);
//! this route only enqueues the task and reads the shared progress registry.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::{ingestion_payload::IngestionPayload, ingestion_task::IngestionTask};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct BuildGraphRequest {
    pub source: String,
    pub extraction_model: String,
}

pub async fn build_graph(State(state): State<ApiState>, Json(request): Json<BuildGraphRequest>) -> Result<impl IntoResponse, ApiError> {
    if request.source.trim().is_empty() {
        return Err(ApiError::ValidationError("source must not be empty".to_string()));
    }

    let task = IngestionTask::enqueue(
        &state.db,
        IngestionPayload::BuildGraph { source_path: request.source, extraction_model: request.extraction_model },
    )
    .await
    .map_err(ApiError::from)?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task.id, "status": "queued" }))))
}

#[derive(Debug, Deserialize)]
pub struct GraphProgressQuery {
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct GraphProgressResponse {
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub percentage: f32,
}

pub async fn graph_progress(State(state): State<ApiState>, Query(query): Query<GraphProgressQuery>) -> Result<impl IntoResponse, ApiError> {
    let progress = state
        .graph_registry
        .progress(&query.source)
        .ok_or_else(|| ApiError::NotFound(format!("no graph build in progress for {}", query.source)))?;

    #[allow(clippy::cast_precision_loss)]
    let percentage = if progress.total == 0 { 100.0 } else { (progress.processed as f32 / progress.total as f32) * 100.0 };

    Ok(Json(GraphProgressResponse { total_chunks: progress.total, processed_chunks: progress.processed, percentage }))
}
