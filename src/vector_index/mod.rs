//! Vector index abstraction (C3). Grounded in
//! `database::vector_store::DatabaseVectorStore`'s split between a thin
//! trait-shaped facade and a concrete pgvector-backed store; this module
//! adds an in-memory reference implementation used by default and in tests,
//! matching the fallback posture the rest of the engine takes toward
//! external dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::embeddings::ProviderIdentity;
use crate::error::EngineError;
use crate::models::{Hit, KBMetadata, KBRecord};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a record in `collection`. The collection's
    /// dimension is fixed by its first upsert; a later upsert with a
    /// mismatched vector length is a `StorageFault`.
    async fn upsert(&self, collection: &str, record: KBRecord) -> Result<(), EngineError>;

    /// Top-`k` nearest neighbours to `query` in `collection` with similarity
    /// at or above `min_similarity`, ties broken by credibility_score desc,
    /// then published_at desc, then record_id lexicographic (spec §4.3).
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<Hit>, EngineError>;

    async fn dimension(&self, collection: &str) -> Option<usize>;

    /// Provider identity last recorded for `collection`'s vectors, if any
    /// have been written (spec §4.2/§9).
    fn provider_identity(&self, collection: &str) -> Option<ProviderIdentity>;

    /// Record which embedding provider produced `collection`'s vectors.
    /// Returns `false` when `collection` already has a different provider
    /// on file, signalling a mismatched embedding space the caller should
    /// surface rather than silently mix.
    fn record_provider_identity(&self, collection: &str, identity: ProviderIdentity) -> bool;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Credibility score scaled to an integer so the tie-break key can derive
/// `Ord` without pulling in a total-ordering float wrapper crate.
fn tie_break_key(hit: &Hit) -> (std::cmp::Reverse<i64>, std::cmp::Reverse<i64>, String) {
    let score_millis = (hit.metadata.credibility_score * 1000.0).round() as i64;
    let published = hit.metadata.published_at.map(|d| d.timestamp()).unwrap_or(i64::MIN);
    (std::cmp::Reverse(score_millis), std::cmp::Reverse(published), hit.record_id.clone())
}

fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        let sim_cmp = b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal);
        if sim_cmp != std::cmp::Ordering::Equal {
            return sim_cmp;
        }
        tie_break_key(a).cmp(&tie_break_key(b))
    });
}

#[derive(Default)]
struct Collection {
    dimension: usize,
    records: HashMap<String, KBRecord>,
}

/// In-process reference implementation: a `HashMap` of collections each
/// doing brute-force cosine similarity. Sufficient for tests and small
/// local/offline deployments.
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Collection>>,
    providers: RwLock<HashMap<String, ProviderIdentity>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, collection: &str, record: KBRecord) -> Result<(), EngineError> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.records.is_empty() {
            entry.dimension = record.vector.len();
        } else if entry.dimension != record.vector.len() {
            return Err(EngineError::StorageFault(format!(
                "collection '{}' expects dimension {}, got {}",
                collection,
                entry.dimension,
                record.vector.len()
            )));
        }
        entry.records.insert(record.record_id.clone(), record);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<Hit>, EngineError> {
        let collections = self.collections.read();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if entry.dimension != query.len() {
            return Err(EngineError::StorageFault(format!(
                "query dimension {} does not match collection '{}' dimension {}",
                query.len(),
                collection,
                entry.dimension
            )));
        }

        let mut hits: Vec<Hit> = entry
            .records
            .values()
            .map(|record| Hit {
                record_id: record.record_id.clone(),
                similarity: cosine_similarity(query, &record.vector),
                metadata: record.metadata.clone(),
                text: record.text.clone(),
            })
            .filter(|hit| hit.similarity >= min_similarity)
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        debug!(collection, returned = hits.len(), "vector search");
        Ok(hits)
    }

    async fn dimension(&self, collection: &str) -> Option<usize> {
        self.collections.read().get(collection).map(|c| c.dimension)
    }

    fn provider_identity(&self, collection: &str) -> Option<ProviderIdentity> {
        self.providers.read().get(collection).cloned()
    }

    fn record_provider_identity(&self, collection: &str, identity: ProviderIdentity) -> bool {
        let mut providers = self.providers.write();
        match providers.get(collection) {
            Some(existing) if *existing != identity => false,
            _ => {
                providers.insert(collection.to_string(), identity);
                true
            }
        }
    }
}

/// Postgres/pgvector-backed implementation. Grounded in
/// `database::vector_store::DatabaseVectorStore`: a thin wrapper over a
/// shared `PgPool` issuing parameterized queries against a
/// `kb_records(collection, record_id, vector, metadata, text)` table with an
/// HNSW index on `vector`.
pub struct PostgresVectorIndex {
    pool: Arc<PgPool>,
    /// Process-local provider-identity cache; a full deployment would
    /// persist this alongside `kb_records` so it survives restarts.
    providers: RwLock<HashMap<String, ProviderIdentity>>,
}

impl PostgresVectorIndex {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            providers: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for PostgresVectorIndex {
    async fn upsert(&self, collection: &str, record: KBRecord) -> Result<(), EngineError> {
        let metadata_json = serde_json::to_value(&record.metadata)
            .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        let vector_literal = format!(
            "[{}]",
            record.vector.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
        );

        sqlx::query(
            "INSERT INTO kb_records (collection, record_id, vector, metadata, text)
             VALUES ($1, $2, $3::vector, $4, $5)
             ON CONFLICT (collection, record_id)
             DO UPDATE SET vector = EXCLUDED.vector, metadata = EXCLUDED.metadata, text = EXCLUDED.text",
        )
        .bind(collection)
        .bind(&record.record_id)
        .bind(&vector_literal)
        .bind(&metadata_json)
        .bind(&record.text)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;

        info!(collection, record_id = %record.record_id, "upserted vector record");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<Hit>, EngineError> {
        let vector_literal = format!("[{}]", query.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","));

        let rows: Vec<(String, String, serde_json::Value, f32)> = sqlx::query_as(
            "SELECT record_id, text, metadata, 1 - (vector <=> $2::vector) AS similarity
             FROM kb_records
             WHERE collection = $1
             ORDER BY vector <=> $2::vector
             LIMIT $3",
        )
        .bind(collection)
        .bind(&vector_literal)
        .bind(k as i64)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;

        let mut hits: Vec<Hit> = rows
            .into_iter()
            .filter(|(_, _, _, similarity)| *similarity >= min_similarity)
            .map(|(record_id, text, metadata_json, similarity)| {
                let metadata: KBMetadata = serde_json::from_value(metadata_json)
                    .expect("kb_records.metadata must deserialize to KBMetadata");
                Hit {
                    record_id,
                    similarity,
                    metadata,
                    text,
                }
            })
            .collect();

        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn dimension(&self, collection: &str) -> Option<usize> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT vector_dims(vector) FROM kb_records WHERE collection = $1 LIMIT 1")
            .bind(collection)
            .fetch_optional(self.pool.as_ref())
            .await
            .ok()
            .flatten();
        row.map(|(dim,)| dim as usize)
    }

    fn provider_identity(&self, collection: &str) -> Option<ProviderIdentity> {
        self.providers.read().get(collection).cloned()
    }

    fn record_provider_identity(&self, collection: &str, identity: ProviderIdentity) -> bool {
        let mut providers = self.providers.write();
        match providers.get(collection) {
            Some(existing) if *existing != identity => false,
            _ => {
                providers.insert(collection.to_string(), identity);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredibilityLevel, SourceKind};

    fn record(id: &str, vector: Vec<f32>, score: f32) -> KBRecord {
        KBRecord {
            record_id: id.to_string(),
            vector,
            text: format!("text for {id}"),
            metadata: KBMetadata {
                kind: SourceKind::News,
                source_name: "Test".into(),
                url: None,
                published_at: None,
                title: None,
                credibility_score: score,
                credibility_level: CredibilityLevel::Medium,
                is_verified_source: false,
                canon_verdict: None,
            },
        }
    }

    #[tokio::test]
    async fn search_returns_nothing_for_unknown_collection() {
        let index = InMemoryVectorIndex::new();
        let hits = index.search("missing", &[1.0, 0.0], 5, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let index = InMemoryVectorIndex::new();
        index.upsert("c", record("a", vec![1.0, 0.0], 0.5)).await.unwrap();
        let err = index.upsert("c", record("b", vec![1.0, 0.0, 0.0], 0.5)).await.unwrap_err();
        assert!(matches!(err, EngineError::StorageFault(_)));
    }

    #[tokio::test]
    async fn search_orders_by_similarity_then_credibility() {
        let index = InMemoryVectorIndex::new();
        index.upsert("c", record("low-cred", vec![1.0, 0.0], 0.3)).await.unwrap();
        index.upsert("c", record("high-cred", vec![1.0, 0.0], 0.9)).await.unwrap();
        let hits = index.search("c", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits[0].record_id, "high-cred");
        assert_eq!(hits[1].record_id, "low-cred");
    }

    #[tokio::test]
    async fn search_respects_min_similarity_floor() {
        let index = InMemoryVectorIndex::new();
        index.upsert("c", record("orthogonal", vec![0.0, 1.0], 0.9)).await.unwrap();
        let hits = index.search("c", &[1.0, 0.0], 10, 0.5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn record_provider_identity_detects_mismatch() {
        let index = InMemoryVectorIndex::new();
        let a = ProviderIdentity { model_name: "ollama".into(), dimension: 768 };
        let b = ProviderIdentity { model_name: "deterministic-fallback".into(), dimension: 768 };
        assert!(index.record_provider_identity("c", a.clone()));
        assert!(index.record_provider_identity("c", a.clone()));
        assert!(!index.record_provider_identity("c", b));
        assert_eq!(index.provider_identity("c"), Some(a));
    }
}
