//! Graph Store (§4.4): entities, relationships, and per-chunk mentions,
//! sharing the transactional connection with the Chunk Store. Entities and
//! relationships are deduplicated and shared across documents (EXP-4
//! resolution 4); Mentions are the only per-chunk rows.

use serde::Deserialize;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::{
    error::AppError,
    ontology::type_weight_for_name,
    storage::db::SurrealDbClient,
    storage::types::{
        chunk::Chunk, document::deserialize_flexible_id, entity_mention::EntityMention, graph_entity::GraphEntity,
        graph_relationship::GraphRelationship, relationship_mention::RelationshipMention,
    },
};

/// Transient write conflicts (concurrent upserts racing on the same unique
/// index) are retried a small bounded number of times with backoff (EXP-3),
/// mirroring the donor's own retry idiom around relationship-edge writes.
fn conflict_retry_strategy() -> impl Iterator<Item = std::time::Duration> {
    ExponentialBackoff::from_millis(50).map(jitter).take(3)
}

fn is_conflict(err: &AppError) -> bool {
    matches!(err, AppError::Database(inner) if inner.to_string().contains("read or write conflict"))
}

async fn retry_on_conflict<F, Fut, T>(f: F) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut last_err = None;
    for delay in std::iter::once(std::time::Duration::ZERO).chain(conflict_retry_strategy()) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if is_conflict(&err) => last_err = Some(err),
            Err(err) => return Err(err),
        }
    }
    // unreachable in practice (loop always executes at least once and returns
    // early on success or non-conflict error); kept for exhaustiveness.
    Err(last_err.unwrap_or_else(|| AppError::InternalStorageError("retry loop exited without result".into())))
}

/// Idempotent on `(name, type)` (§4.4): updates the description when one is
/// provided and the row already exists, otherwise inserts a fresh entity.
pub async fn upsert_entity(
    db: &SurrealDbClient,
    name: &str,
    entity_type: &str,
    description: Option<&str>,
) -> Result<GraphEntity, AppError> {
    retry_on_conflict(|| async {
        let mut response = db
            .client
            .query("SELECT * FROM entities WHERE name = $name AND entity_type = $entity_type LIMIT 1")
            .bind(("name", name.to_string()))
            .bind(("entity_type", entity_type.to_string()))
            .await?;
        let existing: Vec<GraphEntity> = response.take(0)?;

        if let Some(found) = existing.into_iter().next() {
            let Some(description) = description else {
                return Ok(found);
            };
            let updated: Option<GraphEntity> = db
                .client
                .query("UPDATE type::thing('entities', $id) SET description = $description RETURN AFTER")
                .bind(("id", found.id.clone()))
                .bind(("description", description.to_string()))
                .await?
                .take(0)?;
            return updated.ok_or_else(|| AppError::InternalStorageError("failed to update entity".into()));
        }

        let entity = GraphEntity::new(name.to_string(), entity_type.to_string(), description.map(str::to_string));
        db.store_item(entity)
            .await?
            .ok_or_else(|| AppError::InternalStorageError("failed to insert entity".into()))
    })
    .await
}

/// Idempotent on `(source, target, type)` (§4.4).
pub async fn upsert_relationship(
    db: &SurrealDbClient,
    source_entity_id: &str,
    target_entity_id: &str,
    relationship_type: &str,
    description: Option<&str>,
    weight: f32,
) -> Result<GraphRelationship, AppError> {
    retry_on_conflict(|| async {
        let mut response = db
            .client
            .query(
                "SELECT * FROM relationships \
                 WHERE source_entity_id = $source AND target_entity_id = $target AND relationship_type = $rel_type \
                 LIMIT 1",
            )
            .bind(("source", source_entity_id.to_string()))
            .bind(("target", target_entity_id.to_string()))
            .bind(("rel_type", relationship_type.to_string()))
            .await?;
        let existing: Vec<GraphRelationship> = response.take(0)?;

        if let Some(found) = existing.into_iter().next() {
            let Some(description) = description else {
                return Ok(found);
            };
            let updated: Option<GraphRelationship> = db
                .client
                .query("UPDATE type::thing('relationships', $id) SET description = $description RETURN AFTER")
                .bind(("id", found.id.clone()))
                .bind(("description", description.to_string()))
                .await?
                .take(0)?;
            return updated.ok_or_else(|| AppError::InternalStorageError("failed to update relationship".into()));
        }

        let relationship = GraphRelationship::new(
            source_entity_id.to_string(),
            target_entity_id.to_string(),
            relationship_type.to_string(),
            description.map(str::to_string),
            weight,
        );
        db.store_item(relationship)
            .await?
            .ok_or_else(|| AppError::InternalStorageError("failed to insert relationship".into()))
    })
    .await
}

/// Unique on `(entity_id, chunk_id)`; a duplicate mention (re-extraction
/// hitting the same chunk) is a no-op rather than an error, so `build_graph`
/// can be called idempotently (P6).
pub async fn insert_entity_mention(
    db: &SurrealDbClient,
    entity_id: &str,
    chunk_id: &str,
    mention_text: Option<&str>,
    confidence: f32,
) -> Result<(), AppError> {
    let mut response = db
        .client
        .query("SELECT * FROM entity_mentions WHERE entity_id = $entity_id AND chunk_id = $chunk_id LIMIT 1")
        .bind(("entity_id", entity_id.to_string()))
        .bind(("chunk_id", chunk_id.to_string()))
        .await?;
    let existing: Vec<EntityMention> = response.take(0)?;
    if !existing.is_empty() {
        return Ok(());
    }

    let mention = EntityMention::new(entity_id.to_string(), chunk_id.to_string(), mention_text.map(str::to_string), confidence);
    db.store_item(mention).await?;
    Ok(())
}

pub async fn insert_relationship_mention(
    db: &SurrealDbClient,
    relationship_id: &str,
    chunk_id: &str,
    context: Option<&str>,
    confidence: f32,
) -> Result<(), AppError> {
    let mut response = db
        .client
        .query("SELECT * FROM relationship_mentions WHERE relationship_id = $rel_id AND chunk_id = $chunk_id LIMIT 1")
        .bind(("rel_id", relationship_id.to_string()))
        .bind(("chunk_id", chunk_id.to_string()))
        .await?;
    let existing: Vec<RelationshipMention> = response.take(0)?;
    if !existing.is_empty() {
        return Ok(());
    }

    let mention = RelationshipMention::new(relationship_id.to_string(), chunk_id.to_string(), context.map(str::to_string), confidence);
    db.store_item(mention).await?;
    Ok(())
}

pub async fn chunk_has_entity_mention(db: &SurrealDbClient, chunk_id: &str) -> Result<bool, AppError> {
    #[derive(Deserialize)]
    struct CountRow {
        count: u64,
    }
    let mut response = db
        .client
        .query("SELECT count() AS count FROM entity_mentions WHERE chunk_id = $chunk_id GROUP ALL")
        .bind(("chunk_id", chunk_id.to_string()))
        .await?;
    let rows: Vec<CountRow> = response.take(0)?;
    Ok(rows.first().is_some_and(|r| r.count > 0))
}

pub async fn entities_of_chunk(db: &SurrealDbClient, chunk_id: &str) -> Result<Vec<GraphEntity>, AppError> {
    let mut response = db
        .client
        .query(
            "SELECT * FROM entities WHERE id IN (\
                SELECT VALUE entity_id FROM entity_mentions WHERE chunk_id = $chunk_id\
             )",
        )
        .bind(("chunk_id", chunk_id.to_string()))
        .await?;
    Ok(response.take(0)?)
}

#[derive(Debug, Clone)]
pub struct ChunkWithEntities {
    pub chunk_id: String,
    pub entity_names: Vec<String>,
    pub entity_types: Vec<String>,
    pub entity_count: u64,
}

/// Chunks mentioning any of `entity_ids`, with aggregated entity names/types
/// per chunk (§4.4), grouped and ordered by descending distinct-entity count
/// then ascending ordinal index — the ranking the graph-augmentation
/// chunk-recall step (§4.9.4 step 3) relies on.
pub async fn chunks_of_entities(db: &SurrealDbClient, entity_ids: &[String]) -> Result<Vec<ChunkWithEntities>, AppError> {
    if entity_ids.is_empty() {
        return Ok(Vec::new());
    }

    #[derive(Deserialize)]
    struct MentionRow {
        #[serde(deserialize_with = "deserialize_flexible_id")]
        chunk_id: String,
        entity_id: String,
    }

    let mut response = db
        .client
        .query("SELECT chunk_id, entity_id FROM entity_mentions WHERE entity_id IN $ids")
        .bind(("ids", entity_ids.to_vec()))
        .await?;
    let mentions: Vec<MentionRow> = response.take(0)?;
    if mentions.is_empty() {
        return Ok(Vec::new());
    }

    let mut entity_response = db
        .client
        .query("SELECT * FROM entities WHERE id IN $ids")
        .bind(("ids", entity_ids.to_vec()))
        .await?;
    let entities: Vec<GraphEntity> = entity_response.take(0)?;
    let by_id: std::collections::HashMap<String, GraphEntity> = entities.into_iter().map(|e| (e.id.clone(), e)).collect();

    let mut by_chunk: std::collections::HashMap<String, (Vec<String>, Vec<String>)> = std::collections::HashMap::new();
    for mention in mentions {
        let Some(entity) = by_id.get(&mention.entity_id) else { continue };
        let entry = by_chunk.entry(mention.chunk_id).or_default();
        entry.0.push(entity.name.clone());
        entry.1.push(entity.entity_type.clone());
    }

    let chunk_ids: Vec<String> = by_chunk.keys().cloned().collect();
    let chunks = Chunk::get_many(db, &chunk_ids).await?;
    let ordinal_by_id: std::collections::HashMap<String, i64> = chunks.into_iter().map(|c| (c.id, c.chunk_index)).collect();

    let mut out: Vec<ChunkWithEntities> = by_chunk
        .into_iter()
        .map(|(chunk_id, (entity_names, entity_types))| ChunkWithEntities {
            chunk_id,
            entity_count: entity_names.len() as u64,
            entity_names,
            entity_types,
        })
        .collect();

    out.sort_by(|a, b| {
        b.entity_count.cmp(&a.entity_count).then_with(|| {
            let a_ordinal = ordinal_by_id.get(&a.chunk_id).copied().unwrap_or(i64::MAX);
            let b_ordinal = ordinal_by_id.get(&b.chunk_id).copied().unwrap_or(i64::MAX);
            a_ordinal.cmp(&b_ordinal).then_with(|| a.chunk_id.cmp(&b.chunk_id))
        })
    });
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct RelatedEntity {
    pub entity: GraphEntity,
    pub score: f32,
}

/// Neighbor expansion (§4.4, §4.9.4 step 2): entities reachable from any seed
/// by a relationship edge in either direction, excluding the seeds
/// themselves, scored by `stored_weight * type_weight` and capped at `max`.
pub async fn related_entities(db: &SurrealDbClient, seed_ids: &[String], max: usize) -> Result<Vec<RelatedEntity>, AppError> {
    if seed_ids.is_empty() || max == 0 {
        return Ok(Vec::new());
    }

    #[derive(Deserialize)]
    struct EdgeRow {
        #[serde(deserialize_with = "deserialize_flexible_id")]
        source_entity_id: String,
        target_entity_id: String,
        relationship_type: String,
        weight: f32,
    }

    let mut response = db
        .client
        .query(
            "SELECT source_entity_id, target_entity_id, relationship_type, weight FROM relationships \
             WHERE source_entity_id IN $seeds OR target_entity_id IN $seeds",
        )
        .bind(("seeds", seed_ids.to_vec()))
        .await?;
    let edges: Vec<EdgeRow> = response.take(0)?;

    let seed_set: std::collections::HashSet<&String> = seed_ids.iter().collect();
    let mut scores: std::collections::HashMap<String, f32> = std::collections::HashMap::new();

    for edge in edges {
        let neighbor = if seed_set.contains(&edge.source_entity_id) {
            edge.target_entity_id
        } else {
            edge.source_entity_id
        };
        if seed_set.contains(&neighbor) {
            continue;
        }
        let score = edge.weight * type_weight_for_name(&edge.relationship_type);
        let entry = scores.entry(neighbor).or_insert(0.0);
        *entry += score;
    }

    let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max);

    if ranked.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
    let mut entity_response = db
        .client
        .query("SELECT * FROM entities WHERE id IN $ids")
        .bind(("ids", ids))
        .await?;
    let entities: Vec<GraphEntity> = entity_response.take(0)?;
    let by_id: std::collections::HashMap<String, GraphEntity> = entities.into_iter().map(|e| (e.id.clone(), e)).collect();

    Ok(ranked
        .into_iter()
        .filter_map(|(id, score)| by_id.get(&id).cloned().map(|entity| RelatedEntity { entity, score }))
        .collect())
}

#[derive(Debug, Clone)]
pub struct ScoredEntity {
    pub entity: GraphEntity,
    pub score: f32,
}

/// Substring match on entity names, ranked by mention count and a
/// log-scaled popularity bonus (§4.9.4 step 1).
pub async fn keyword_entity_search(db: &SurrealDbClient, query: &str, limit: usize) -> Result<Vec<ScoredEntity>, AppError> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut response = db
        .client
        .query("SELECT * FROM entities WHERE string::lowercase(name) CONTAINS $needle")
        .bind(("needle", needle))
        .await?;
    let matches: Vec<GraphEntity> = response.take(0)?;

    let mut scored = Vec::with_capacity(matches.len());
    for entity in matches {
        let count = mention_count_for_entity(db, &entity.id).await?;
        scored.push(ScoredEntity { score: mention_popularity_score(count), entity });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.entity.id.cmp(&b.entity.id)));
    scored.truncate(limit);
    Ok(scored)
}

async fn mention_count_for_entity(db: &SurrealDbClient, entity_id: &str) -> Result<u64, AppError> {
    #[derive(Deserialize)]
    struct CountRow {
        count: u64,
    }
    let mut response = db
        .client
        .query("SELECT count() AS count FROM entity_mentions WHERE entity_id = $entity_id GROUP ALL")
        .bind(("entity_id", entity_id.to_string()))
        .await?;
    let rows: Vec<CountRow> = response.take(0)?;
    Ok(rows.first().map_or(0, |r| r.count))
}

fn mention_popularity_score(mention_count: u64) -> f32 {
    1.0 + (mention_count as f32 + 1.0).ln()
}

/// Delete every mention row for the given chunks. Called whenever chunks are
/// removed (re-ingest or document delete) so the subsequent
/// `cleanup_orphans` can see the true mention counts.
pub async fn delete_mentions_for_chunks(db: &SurrealDbClient, chunk_ids: &[String]) -> Result<(), AppError> {
    if chunk_ids.is_empty() {
        return Ok(());
    }
    db.client
        .query("DELETE entity_mentions WHERE chunk_id IN $ids; DELETE relationship_mentions WHERE chunk_id IN $ids;")
        .bind(("ids", chunk_ids.to_vec()))
        .await?
        .check()?;
    Ok(())
}

/// Orphan-free cleanup (I4): entities with zero mentions are deleted first,
/// then relationships with zero mentions. Order matters only for clarity —
/// neither deletion cascades onto the other (§9 "never rely on cascading
/// deletes of entities; they are shared").
pub async fn cleanup_orphans(db: &SurrealDbClient) -> Result<(), AppError> {
    db.client
        .query(
            "DELETE entities WHERE id NOT IN (SELECT VALUE entity_id FROM entity_mentions); \
             DELETE relationships WHERE id NOT IN (SELECT VALUE relationship_id FROM relationship_mentions);",
        )
        .await?
        .check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn mem_db(label: &str) -> SurrealDbClient {
        let db = SurrealDbClient::memory("graph_ns", &format!("{label}_{}", Uuid::new_v4()))
            .await
            .expect("mem db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn upsert_entity_is_idempotent_on_name_and_type() {
        let db = mem_db("entity").await;
        let first = upsert_entity(&db, "Kant", "PERSON", None).await.expect("first");
        let second = upsert_entity(&db, "Kant", "PERSON", Some("German philosopher")).await.expect("second");
        assert_eq!(first.id, second.id);
        assert_eq!(second.description.as_deref(), Some("German philosopher"));
    }

    #[tokio::test]
    async fn cleanup_orphans_removes_unmentioned_entities() {
        let db = mem_db("orphan").await;
        let entity = upsert_entity(&db, "Korsgaard", "PERSON", None).await.expect("entity");
        cleanup_orphans(&db).await.expect("cleanup");

        let remaining: Vec<GraphEntity> = db.get_all_stored_items().await.expect("remaining");
        assert!(remaining.is_empty());

        insert_entity_mention(&db, &entity.id, "chunk-1", Some("Korsgaard"), 0.9).await.expect("mention");
        let entity = upsert_entity(&db, "Korsgaard", "PERSON", None).await.expect("re-upsert");
        cleanup_orphans(&db).await.expect("cleanup again");
        let remaining: Vec<GraphEntity> = db.get_all_stored_items().await.expect("remaining");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, entity.id);
    }

    #[tokio::test]
    async fn related_entities_excludes_seeds_and_scores_by_weight() {
        let db = mem_db("related").await;
        let kant = upsert_entity(&db, "Kant", "PERSON", None).await.expect("kant");
        let korsgaard = upsert_entity(&db, "Korsgaard", "PERSON", None).await.expect("korsgaard");
        upsert_relationship(&db, &korsgaard.id, &kant.id, "STUDIES", None, 1.0).await.expect("rel");

        let related = related_entities(&db, &[korsgaard.id.clone()], 5).await.expect("related");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].entity.id, kant.id);
    }

    #[tokio::test]
    async fn insert_entity_mention_is_idempotent() {
        let db = mem_db("mention").await;
        let entity = upsert_entity(&db, "Hume", "PERSON", None).await.expect("entity");
        insert_entity_mention(&db, &entity.id, "chunk-1", None, 0.8).await.expect("first");
        insert_entity_mention(&db, &entity.id, "chunk-1", None, 0.8).await.expect("second");
        assert!(chunk_has_entity_mention(&db, "chunk-1").await.expect("has mention"));

        let all: Vec<EntityMention> = db.get_all_stored_items().await.expect("all mentions");
        assert_eq!(all.len(), 1);
    }
}
