//! Embedding mode (§4.9.1): ANN search over the Vector Index — Chunk, then a
//! Chunk Store fetch per hit. A hit whose chunk row has since disappeared
//! (e.g. concurrent delete) is logged and dropped rather than failing the
//! whole search.

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::chunk::Chunk, vector_index::ChunkVectorIndex},
    utils::embedding::EmbeddingProvider,
};
use tracing::{instrument, warn};

use crate::RetrievedChunk;

#[instrument(skip(db, embedder), fields(k))]
pub async fn run(db: &SurrealDbClient, embedder: &EmbeddingProvider, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, AppError> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let query_vector = embedder.embed(query).await?;
    let index = ChunkVectorIndex::new(db, embedder.dimension());
    let hits = index.search(&query_vector, k).await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        match Chunk::get(db, &hit.id).await? {
            Some(chunk) => results.push(RetrievedChunk { chunk, score: hit.score, graph: false, matched_entities: Vec::new() }),
            None => warn!(chunk_id = %hit.id, "embedding hit references a missing chunk; dropping"),
        }
    }
    Ok(results)
}
