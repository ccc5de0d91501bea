use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use routes::{
    delete::delete,
    graph::{build_graph, graph_progress},
    ingest::ingest,
    liveness::live,
    model::set_embedding_model,
    readiness::ready,
    search::search,
    sources::list_sources,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1: the external interfaces of §6
/// (`ingest`, `delete`, `list_sources`, `search`, `set_embedding_model`,
/// `build_graph`, `graph_progress`) plus liveness/readiness probes. No
/// chat, templates, or session/auth UI — those are out of scope (§1).
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/ingest", post(ingest))
        .route("/delete", post(delete))
        .route("/sources", get(list_sources))
        .route("/search", post(search))
        .route("/model", post(set_embedding_model))
        .route("/graph/build", post(build_graph))
        .route("/graph/progress", get(graph_progress))
}
