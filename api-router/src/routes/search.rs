//! `search(query, k, options)` (§6/§4.9).

use axum::{extract::State, response::IntoResponse, Json};
use retrieval_pipeline::{ChatTurn, GraphAugmentationConfig, RetrievedChunk, SearchMode, SearchOptions};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchModeRequest {
    Embedding,
    Fulltext,
    Hybrid,
    GraphOnly,
    HybridGraph,
}

impl From<SearchModeRequest> for SearchMode {
    fn from(value: SearchModeRequest) -> Self {
        match value {
            SearchModeRequest::Embedding => Self::Embedding,
            SearchModeRequest::Fulltext => Self::Fulltext,
            SearchModeRequest::Hybrid => Self::Hybrid,
            SearchModeRequest::GraphOnly => Self::GraphOnly,
            SearchModeRequest::HybridGraph => Self::HybridGraph,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub role: String,
    pub content: String,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
    pub mode: Option<SearchModeRequest>,
    pub chat_model: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<ChatTurnRequest>,
}

#[derive(Debug, Serialize)]
pub struct MatchedEntityResponse {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Serialize)]
pub struct RetrievedChunkResponse {
    pub chunk_id: String,
    pub document_id: String,
    pub page: Option<i64>,
    pub content: String,
    pub score: f32,
    pub graph: bool,
    pub matched_entities: Vec<MatchedEntityResponse>,
}

impl From<RetrievedChunk> for RetrievedChunkResponse {
    fn from(value: RetrievedChunk) -> Self {
        Self {
            chunk_id: value.chunk.id,
            document_id: value.chunk.document_id,
            page: value.chunk.page,
            content: value.chunk.content,
            score: value.score,
            graph: value.graph,
            matched_entities: value
                .matched_entities
                .into_iter()
                .map(|entity| MatchedEntityResponse { name: entity.name, entity_type: entity.entity_type })
                .collect(),
        }
    }
}

pub async fn search(State(state): State<ApiState>, Json(request): Json<SearchRequest>) -> Result<impl IntoResponse, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::ValidationError("query must not be empty".to_string()));
    }

    let options = SearchOptions {
        mode: request.mode.map_or(SearchMode::Hybrid, SearchMode::from),
        chat_model: request.chat_model,
        chat_history: request
            .chat_history
            .into_iter()
            .map(|turn| ChatTurn { role: turn.role, content: turn.content })
            .collect(),
        graph: GraphAugmentationConfig::default(),
    };

    let results = retrieval_pipeline::search(&state.db, &state.embedder, Some(&state.generator), &request.query, request.k, &options)
        .await
        .map_err(ApiError::from)?;

    let body: Vec<RetrievedChunkResponse> = results.into_iter().map(RetrievedChunkResponse::from).collect();
    Ok(Json(body))
}
