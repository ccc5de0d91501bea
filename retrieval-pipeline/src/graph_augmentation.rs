//! Graph augmentation (§4.9.4): an orthogonal flag layered on top of
//! §4.9.1-§4.9.3. Seeds from entity search, expands to neighbors over the
//! Graph Store, then recalls the chunks that mention any of them.

use std::{cmp::Ordering, collections::HashMap};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, graph_store, types::chunk::Chunk, vector_index::EntityVectorIndex},
    utils::embedding::EmbeddingProvider,
};
use tracing::{instrument, warn};

use crate::{MatchedEntity, RetrievedChunk};

#[derive(Debug, Clone, Copy)]
pub struct GraphAugmentationConfig {
    pub top_entities: usize,
    pub max_related: usize,
    pub max_chunks: usize,
}

impl Default for GraphAugmentationConfig {
    fn default() -> Self {
        Self { top_entities: 3, max_related: 5, max_chunks: 5 }
    }
}

#[instrument(skip(db, embedder, config))]
pub async fn run(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    query: &str,
    config: &GraphAugmentationConfig,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let seed_ids = seed_entities(db, embedder, query, config.top_entities).await?;
    if seed_ids.is_empty() {
        return Ok(Vec::new());
    }

    let neighbors = graph_store::related_entities(db, &seed_ids, config.max_related).await?;

    let mut recall_ids = seed_ids;
    recall_ids.extend(neighbors.into_iter().map(|n| n.entity.id));

    let chunk_hits = graph_store::chunks_of_entities(db, &recall_ids).await?;

    let mut results = Vec::with_capacity(config.max_chunks.min(chunk_hits.len()));
    for hit in chunk_hits.into_iter().take(config.max_chunks) {
        match Chunk::get(db, &hit.chunk_id).await? {
            Some(chunk) => {
                let matched_entities = hit
                    .entity_names
                    .iter()
                    .zip(hit.entity_types.iter())
                    .map(|(name, entity_type)| MatchedEntity { name: name.clone(), entity_type: entity_type.clone() })
                    .collect();
                #[allow(clippy::cast_precision_loss)]
                let score = hit.entity_count as f32;
                results.push(RetrievedChunk { chunk, score, graph: true, matched_entities });
            }
            None => warn!(chunk_id = %hit.chunk_id, "graph chunk recall references a missing chunk; dropping"),
        }
    }
    Ok(results)
}

/// Seed entities (§4.9.4 step 1): keyword-entity and embedding-entity search
/// run in parallel, merged by additive score, top `limit` (ties broken by
/// ascending entity id for determinism).
async fn seed_entities(db: &SurrealDbClient, embedder: &EmbeddingProvider, query: &str, limit: usize) -> Result<Vec<String>, AppError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    const CANDIDATE_MULTIPLIER: usize = 3;
    let query_vector = embedder.embed(query).await?;
    let index = EntityVectorIndex::new(db, embedder.dimension());

    let (keyword_hits, embedding_hits) = tokio::try_join!(
        graph_store::keyword_entity_search(db, query, limit * CANDIDATE_MULTIPLIER),
        index.search(&query_vector, limit * CANDIDATE_MULTIPLIER),
    )?;

    let mut scores: HashMap<String, f32> = HashMap::new();
    for hit in keyword_hits {
        *scores.entry(hit.entity.id).or_default() += hit.score;
    }
    for hit in embedding_hits {
        *scores.entry(hit.id).or_default() += hit.score;
    }

    let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    Ok(ranked.into_iter().map(|(id, _)| id).collect())
}
