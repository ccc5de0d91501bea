//! `ingest(path)` (§6). Enqueues a durable task rather than running inline
//! (EXP-3 worker/queue separation) so the HTTP-facing process never blocks
//! on embedding/chunking I/O.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::types::{ingestion_payload::IngestionPayload, ingestion_task::IngestionTask};
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub path: String,
}

pub async fn ingest(State(state): State<ApiState>, Json(request): Json<IngestRequest>) -> Result<impl IntoResponse, ApiError> {
    if request.path.trim().is_empty() {
        return Err(ApiError::ValidationError("path must not be empty".to_string()));
    }

    let task = IngestionTask::enqueue(&state.db, IngestionPayload::Ingest { source_path: request.path })
        .await
        .map_err(ApiError::from)?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task.id, "status": "queued" }))))
}
