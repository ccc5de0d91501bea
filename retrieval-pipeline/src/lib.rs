//! Retrieval Engine (§4.9): `search(query, k, options) -> [RetrievedChunk]`
//! over four strategies (embedding, fulltext, hybrid, graph-only) plus an
//! orthogonal graph-augmentation flag layered on top of any of the three
//! UI-exposed modes.

pub mod embedding_mode;
pub mod fulltext_mode;
pub mod graph_augmentation;
pub mod hybrid;
mod merge;

use std::collections::BTreeMap;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::chunk::Chunk},
    utils::{embedding::EmbeddingProvider, generation::GenerationProvider},
};
use tracing::{info, instrument};

pub use graph_augmentation::GraphAugmentationConfig;

/// The four modes named in §4.9, plus the orthogonal graph flag folded in as
/// `GraphOnly`/`HybridGraph` so a caller picks exactly one `SearchMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Embedding,
    Fulltext,
    Hybrid,
    GraphOnly,
    HybridGraph,
}

/// One turn of `chat_history`, used only to build the §4.9.2 rewrite prompt.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub chat_model: Option<String>,
    pub chat_history: Vec<ChatTurn>,
    pub graph: GraphAugmentationConfig,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { mode: SearchMode::Hybrid, chat_model: None, chat_history: Vec::new(), graph: GraphAugmentationConfig::default() }
    }
}

/// An entity name/type pair annotating a graph-augmented hit (§4.9.4 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedEntity {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub graph: bool,
    pub matched_entities: Vec<MatchedEntity>,
}

/// `search(query, k, options)` (§4.9). `generator` is only consulted for the
/// fulltext query rewrite (§4.9.2 step 1); a `None` generator or a missing
/// `chat_model` simply skips the rewrite and searches the raw query.
#[instrument(skip(db, embedder, generator, options), fields(mode = ?options.mode, k))]
pub async fn search(
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

    let mut results = match options.mode {
        SearchMode::Embedding => embedding_mode::run(db, embedder, query, k).await?,
        SearchMode::Fulltext => fulltext_mode::run(db, generator, query, k, options).await?,
        SearchMode::Hybrid | SearchMode::HybridGraph => hybrid::run(db, embedder, generator, query, k, options).await?,
        SearchMode::GraphOnly => Vec::new(),
    };

    if matches!(options.mode, SearchMode::GraphOnly | SearchMode::HybridGraph) {
        let graph_hits = graph_augmentation::run(db, embedder, query, &options.graph).await?;
        results = merge::dedupe_preserving_order(results, graph_hits);
    }

    results.truncate(k);
    log_source_distribution(query, &results);
    Ok(results)
}

/// §4.9 closing note: "every search logs a per-source hit distribution".
fn log_source_distribution(query: &str, results: &[RetrievedChunk]) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for result in results {
        *counts.entry(result.chunk.document_id.clone()).or_default() += 1;
    }
    info!(query, hits = results.len(), distribution = ?counts, "search complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::chunk_store::{self, NewChunk};
    use uuid::Uuid;

    async fn mem_db(label: &str) -> SurrealDbClient {
        let db = SurrealDbClient::memory("retrieval_ns", &format!("{label}_{}", Uuid::new_v4())).await.expect("mem db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn embedding_mode_returns_the_nearest_chunk() {
        let db = mem_db("embedding").await;
        let embedder = EmbeddingProvider::new_hashed(8);

        let (document, _) = chunk_store::insert_document(&db, "/a.txt", embedder.model_name()).await.expect("doc");
        let chunks = chunk_store::replace_chunks_of(
            &db,
            &document.id,
            vec![NewChunk { page: None, content: "the quick brown fox".into() }],
        )
        .await
        .expect("chunks");

        let vector = embedder.embed(&chunks[0].content).await.expect("embed");
        let index = common::storage::vector_index::ChunkVectorIndex::new(&db, embedder.dimension());
        index.upsert(&chunks[0].id, vector, embedder.model_name()).await.expect("upsert");

        let options = SearchOptions { mode: SearchMode::Embedding, ..Default::default() };
        let results = search(&db, &embedder, None, "the quick brown fox", 5, &options).await.expect("search");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, chunks[0].id);
        assert!(!results[0].graph);
    }

    #[tokio::test]
    async fn fulltext_mode_without_a_chat_model_searches_the_raw_query() {
        let db = mem_db("fulltext").await;
        let embedder = EmbeddingProvider::new_hashed(8);

        let (document, _) = chunk_store::insert_document(&db, "/b.txt", embedder.model_name()).await.expect("doc");
        chunk_store::replace_chunks_of(&db, &document.id, vec![NewChunk { page: None, content: "lazy dog sleeps".into() }])
            .await
            .expect("chunks");

        let options = SearchOptions { mode: SearchMode::Fulltext, ..Default::default() };
        let results = search(&db, &embedder, None, "lazy dog", 5, &options).await.expect("search");

        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn zero_k_short_circuits_without_touching_storage() {
        let db = mem_db("zero_k").await;
        let embedder = EmbeddingProvider::new_hashed(8);
        let options = SearchOptions::default();

        let results = search(&db, &embedder, None, "anything", 0, &options).await.expect("search");
        assert!(results.is_empty());
    }
}
