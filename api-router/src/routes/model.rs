//! `set_embedding_model(name, force)` (§6/§4.10). `dimension` is supplied by
//! the caller: unlike the chunk/entity embedders, this boundary has no
//! registry mapping an arbitrary model name to its output width before the
//! model is ever loaded, so the operator (or the UI layer driving a model
//! picker) is the natural source of truth for it.

use axum::{extract::State, response::IntoResponse, Json};
use common::governor::SetResult;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SetModelRequest {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SetModelResponse {
    Unchanged,
    ConfirmationRequired { existing_models: Vec<String>, new_model: String },
    Ok,
}

pub async fn set_embedding_model(State(state): State<ApiState>, Json(request): Json<SetModelRequest>) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .governor
        .set(&request.name, request.dimension, request.force)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(match result {
        SetResult::Unchanged => SetModelResponse::Unchanged,
        SetResult::ConfirmationRequired { existing_models, new_model } => {
            SetModelResponse::ConfirmationRequired { existing_models, new_model }
        }
        SetResult::Ok => SetModelResponse::Ok,
    }))
}
