//! Hybrid mode (§4.9.3): embedding and fulltext run concurrently, then merge
//! with a seen-set keyed by `(source, first 50 chars of content)` so the
//! same passage surfaced by both strategies counts once.

use std::collections::HashSet;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document::Document},
    utils::{embedding::EmbeddingProvider, generation::GenerationProvider},
};
use tracing::instrument;

use crate::{embedding_mode, fulltext_mode, RetrievedChunk, SearchOptions};

const CAP_MULTIPLIER: usize = 2;
const DEDUPE_PREFIX_CHARS: usize = 50;

#[instrument(skip(db, embedder, generator, options), fields(k))]
pub async fn run(
    db: &SurrealDbClient,
    embedder: &EmbeddingProvider,
    generator: Option<&GenerationProvider>,
    query: &str,
    k: usize,
    options: &SearchOptions,
) -> Result<Vec<RetrievedChunk>, AppError> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let (embedding_hits, fulltext_hits) = tokio::try_join!(
        embedding_mode::run(db, embedder, query, k),
        fulltext_mode::run(db, generator, query, k, options),
    )?;

    let cap = k.saturating_mul(CAP_MULTIPLIER);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut merged = Vec::new();

    // Embedding hits come first so they win ties against fulltext hits for
    // the same (source, prefix) key, per the "preferring embedding hits" rule.
    for candidate in embedding_hits.into_iter().chain(fulltext_hits) {
        if merged.len() >= cap {
            break;
        }
        let key = dedupe_key(db, &candidate).await?;
        if seen.insert(key) {
            merged.push(candidate);
        }
    }

    merged.truncate(k);
    Ok(merged)
}

async fn dedupe_key(db: &SurrealDbClient, candidate: &RetrievedChunk) -> Result<(String, String), AppError> {
    let source = db
        .get_item::<Document>(&candidate.chunk.document_id)
        .await?
        .map(|document| document.source)
        .unwrap_or_else(|| candidate.chunk.document_id.clone());
    let prefix: String = candidate.chunk.content.chars().take(DEDUPE_PREFIX_CHARS).collect();
    Ok((source, prefix))
}
