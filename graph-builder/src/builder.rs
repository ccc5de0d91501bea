//! Graph Builder (§4.8): the batched driver that walks a document's chunks
//! through the Extractor and populates the Graph Store + Vector Index —
//! Entity. Decoupled from ingest so latency-sensitive ingest never waits on
//! LLM extraction (§4.7 closing note).

use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

use common::{
    error::AppError,
    storage::{
        chunk_store, db::SurrealDbClient, graph_store,
        types::{document::Document, entity_embedding::EntityEmbedding},
        vector_index::EntityVectorIndex,
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::{info, instrument, warn};

use crate::extractor::Extractor;

const BATCH_WIDTH: usize = 8;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphProgress {
    pub processed: usize,
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub batch_index: usize,
    pub total_batches: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphReport {
    pub processed: usize,
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Polled between batches (and, within a batch, before each chunk starts its
/// own extraction call) so a caller can abort a long-running build without
/// losing the extractions already persisted (§4.8 step 6).
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ChunkOutcome {
    Succeeded,
    Skipped,
    Failed,
}

/// `build_graph(source_path, extraction_model, on_progress) -> GraphReport`
/// (§4.8). `on_progress` is called once per completed batch.
#[instrument(skip(db, extractor, embedder, on_progress, cancel), fields(source_path))]
pub async fn build_graph(
    db: &SurrealDbClient,
    source_path: &str,
    extractor: &Extractor,
    embedder: &EmbeddingProvider,
    cancel: &CancellationFlag,
    mut on_progress: impl FnMut(GraphProgress),
) -> Result<GraphReport, AppError> {
    let document = Document::find_by_source_and_model(db, source_path, embedder.model_name())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no document for source {source_path}")))?;

    let chunks = chunk_store::get_chunks(db, &document.id).await?;
    let total = chunks.len();
    let total_batches = total.div_ceil(BATCH_WIDTH).max(1);

    let mut report = GraphReport { total, ..Default::default() };

    for (batch_index, batch) in chunks.chunks(BATCH_WIDTH).enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let outcomes = futures::future::join_all(batch.iter().map(|chunk| async {
            if cancel.is_cancelled() {
                return ChunkOutcome::Skipped;
            }
            process_chunk(db, extractor, &chunk.id, &chunk.content).await
        }))
        .await;

        for outcome in outcomes {
            report.processed += 1;
            match outcome {
                ChunkOutcome::Succeeded => report.successful += 1,
                ChunkOutcome::Skipped => report.skipped += 1,
                ChunkOutcome::Failed => report.failed += 1,
            }
        }

        on_progress(GraphProgress {
            processed: report.processed,
            total,
            successful: report.successful,
            skipped: report.skipped,
            batch_index,
            total_batches,
        });
    }

    if !report.cancelled {
        embed_new_entities(db, embedder).await?;
    }

    info!(
        processed = report.processed,
        total = report.total,
        successful = report.successful,
        skipped = report.skipped,
        failed = report.failed,
        cancelled = report.cancelled,
        "graph build finished"
    );
    Ok(report)
}

/// Per-chunk state machine: `pending -> in-flight -> {succeeded | skipped |
/// failed}`. A chunk that already has a mention is skipped without calling
/// the model (idempotent re-runs, P6); an extraction error is per-chunk and
/// never aborts the document (§4.8 "State machine per chunk").
async fn process_chunk(db: &SurrealDbClient, extractor: &Extractor, chunk_id: &str, content: &str) -> ChunkOutcome {
    match graph_store::chunk_has_entity_mention(db, chunk_id).await {
        Ok(true) => return ChunkOutcome::Skipped,
        Ok(false) => {}
        Err(err) => {
            warn!(chunk_id, %err, "failed to check existing mentions; treating chunk as failed");
            return ChunkOutcome::Failed;
        }
    }

    let extraction = match extractor.extract(content).await {
        Ok(extraction) => extraction,
        Err(err) => {
            warn!(chunk_id, %err, "extraction call failed");
            return ChunkOutcome::Failed;
        }
    };

    if extraction.entities.is_empty() {
        return ChunkOutcome::Skipped;
    }

    if let Err(err) = persist_extraction(db, chunk_id, &extraction).await {
        warn!(chunk_id, %err, "failed to persist extraction");
        return ChunkOutcome::Failed;
    }

    ChunkOutcome::Succeeded
}

/// §4.8 step 3: upsert entities/relationships then record mentions, so
/// shared entities across documents and chunks deduplicate to one row.
async fn persist_extraction(db: &SurrealDbClient, chunk_id: &str, extraction: &crate::extractor::ExtractionResult) -> Result<(), AppError> {
    let mut entity_ids = std::collections::HashMap::new();
    for entity in &extraction.entities {
        let stored = graph_store::upsert_entity(db, &entity.name, entity.entity_type.as_str(), entity.description.as_deref()).await?;
        graph_store::insert_entity_mention(db, &stored.id, chunk_id, Some(entity.name.as_str()), 1.0).await?;
        entity_ids.insert(entity.name.clone(), stored.id);
    }

    for relationship in &extraction.relationships {
        let (Some(source_id), Some(target_id)) = (entity_ids.get(&relationship.source), entity_ids.get(&relationship.target)) else {
            continue;
        };
        let stored = graph_store::upsert_relationship(
            db,
            source_id,
            target_id,
            relationship.relationship_type.as_str(),
            relationship.description.as_deref(),
            relationship.weight,
        )
        .await?;
        graph_store::insert_relationship_mention(db, &stored.id, chunk_id, relationship.description.as_deref(), relationship.weight).await?;
    }

    Ok(())
}

/// §4.8 step 4: embed every entity missing a vector for the active model,
/// using `"{name}: {description}"` when a description exists.
async fn embed_new_entities(db: &SurrealDbClient, embedder: &EmbeddingProvider) -> Result<(), AppError> {
    let missing_ids = EntityEmbedding::entities_missing_vector_for_model(db, embedder.model_name()).await?;
    if missing_ids.is_empty() {
        return Ok(());
    }

    let mut response = db
        .client
        .query("SELECT * FROM entities WHERE id IN $ids")
        .bind(("ids", missing_ids.clone()))
        .await?;
    let entities: Vec<common::storage::types::graph_entity::GraphEntity> = response.take(0)?;

    let inputs: Vec<String> = entities.iter().map(|e| e.embedding_input()).collect();
    let vectors = embedder.embed_batch(&inputs).await?;

    let index = EntityVectorIndex::new(db, embedder.dimension());
    for (entity, vector) in entities.iter().zip(vectors) {
        index.upsert(&entity.id, vector, embedder.model_name()).await?;
    }
    index.save();

    Ok(())
}

