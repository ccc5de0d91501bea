//! `list_sources() -> [{source, models[]}]` (§6).

use axum::{extract::State, response::IntoResponse, Json};
use common::storage::chunk_store;
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct SourceSummaryResponse {
    pub source: String,
    pub models: Vec<String>,
}

pub async fn list_sources(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let sources = chunk_store::list_sources(&state.db).await.map_err(ApiError::from)?;
    let body: Vec<SourceSummaryResponse> =
        sources.into_iter().map(|s| SourceSummaryResponse { source: s.source, models: s.models }).collect();
    Ok(Json(body))
}
