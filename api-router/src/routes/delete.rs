//! `delete(source)` (§6): cascades chunks, vectors, and mentions, then
//! leaves the Graph Store orphan-free (§4.1, I4).

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::chunk_store;
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub source: String,
}

pub async fn delete(State(state): State<ApiState>, Json(request): Json<DeleteRequest>) -> Result<impl IntoResponse, ApiError> {
    if request.source.trim().is_empty() {
        return Err(ApiError::ValidationError("source must not be empty".to_string()));
    }

    chunk_store::delete_document(&state.db, &request.source).await.map_err(ApiError::from)?;
    Ok((StatusCode::OK, Json(json!({ "status": "deleted", "source": request.source }))))
}
