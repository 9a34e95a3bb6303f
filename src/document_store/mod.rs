//! Durable document storage (C4). Grounded in
//! `database::client::DatabaseClient` (pooled connection + health check
//! pattern) and `database::models` (one table per collection). Collections
//! map 1:1 to spec §6's persistence layout: `verified_claims`, `news_items`,
//! `gov_items`, `social_items`, `claim_logs`, `ingest_logs`, `feedback`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use tracing::info;

use crate::error::EngineError;
use crate::models::{ClaimLog, Feedback, IngestRun, RawItem, VerifiedClaim};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert keyed by `claim_id` (write-many, last write wins).
    async fn upsert_verified_claim(&self, claim: VerifiedClaim) -> Result<(), EngineError>;
    async fn get_verified_claim(&self, claim_id: &str) -> Result<Option<VerifiedClaim>, EngineError>;
    async fn list_verified_claims(&self) -> Result<Vec<VerifiedClaim>, EngineError>;

    /// Append-only; raw items are immutable once ingested.
    async fn append_raw_item(&self, collection: &str, item: RawItem) -> Result<String, EngineError>;

    /// Write-once audit row; a `ClaimLog` is never updated after insert.
    async fn append_claim_log(&self, log: ClaimLog) -> Result<(), EngineError>;
    async fn list_claim_logs(&self, limit: usize) -> Result<Vec<ClaimLog>, EngineError>;

    /// `IngestRun` rows are inserted once `Running` and then updated in
    /// place as the run completes (the one mutable document type).
    async fn insert_ingest_run(&self, run: IngestRun) -> Result<(), EngineError>;
    async fn update_ingest_run(&self, run: IngestRun) -> Result<(), EngineError>;
    async fn latest_ingest_run(&self) -> Result<Option<IngestRun>, EngineError>;

    async fn append_feedback(&self, feedback: Feedback) -> Result<(), EngineError>;

    async fn health_check(&self) -> bool;
}

/// In-memory reference implementation used by default and in tests.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    verified_claims: RwLock<HashMap<String, VerifiedClaim>>,
    raw_items: RwLock<HashMap<String, Vec<RawItem>>>,
    claim_logs: RwLock<Vec<ClaimLog>>,
    ingest_runs: RwLock<HashMap<String, IngestRun>>,
    feedback: RwLock<Vec<Feedback>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upsert_verified_claim(&self, claim: VerifiedClaim) -> Result<(), EngineError> {
        self.verified_claims.write().insert(claim.claim_id.clone(), claim);
        Ok(())
    }

    async fn get_verified_claim(&self, claim_id: &str) -> Result<Option<VerifiedClaim>, EngineError> {
        Ok(self.verified_claims.read().get(claim_id).cloned())
    }

    async fn list_verified_claims(&self) -> Result<Vec<VerifiedClaim>, EngineError> {
        Ok(self.verified_claims.read().values().cloned().collect())
    }

    async fn append_raw_item(&self, collection: &str, item: RawItem) -> Result<String, EngineError> {
        let id = format!("{}:{}", collection, uuid::Uuid::new_v4());
        self.raw_items.write().entry(collection.to_string()).or_default().push(item);
        Ok(id)
    }

    async fn append_claim_log(&self, log: ClaimLog) -> Result<(), EngineError> {
        self.claim_logs.write().push(log);
        Ok(())
    }

    async fn list_claim_logs(&self, limit: usize) -> Result<Vec<ClaimLog>, EngineError> {
        let logs = self.claim_logs.read();
        let start = logs.len().saturating_sub(limit);
        Ok(logs[start..].to_vec())
    }

    async fn insert_ingest_run(&self, run: IngestRun) -> Result<(), EngineError> {
        self.ingest_runs.write().insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn update_ingest_run(&self, run: IngestRun) -> Result<(), EngineError> {
        self.ingest_runs.write().insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn latest_ingest_run(&self) -> Result<Option<IngestRun>, EngineError> {
        Ok(self.ingest_runs.read().values().max_by_key(|r| r.started_at).cloned())
    }

    async fn append_feedback(&self, feedback: Feedback) -> Result<(), EngineError> {
        self.feedback.write().push(feedback);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Postgres-backed implementation, grounded in `database::client::DatabaseClient`'s
/// pooled-connection pattern. Tables mirror the collection names in spec §6.
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn upsert_verified_claim(&self, claim: VerifiedClaim) -> Result<(), EngineError> {
        let tags = serde_json::to_value(&claim.tags).map_err(|e| EngineError::StorageFault(e.to_string()))?;
        sqlx::query(
            "INSERT INTO verified_claims
               (claim_id, claim_text, normalized_claim_text, verdict, explanation, source_url,
                publisher, language, published_at, tags, provider_tag)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
             ON CONFLICT (claim_id) DO UPDATE SET
               claim_text = EXCLUDED.claim_text,
               normalized_claim_text = EXCLUDED.normalized_claim_text,
               verdict = EXCLUDED.verdict,
               explanation = EXCLUDED.explanation,
               source_url = EXCLUDED.source_url,
               publisher = EXCLUDED.publisher,
               language = EXCLUDED.language,
               published_at = EXCLUDED.published_at,
               tags = EXCLUDED.tags,
               provider_tag = EXCLUDED.provider_tag",
        )
        .bind(&claim.claim_id)
        .bind(&claim.claim_text)
        .bind(&claim.normalized_claim_text)
        .bind(format!("{:?}", claim.verdict).to_uppercase())
        .bind(&claim.explanation)
        .bind(&claim.source_url)
        .bind(&claim.publisher)
        .bind(&claim.language)
        .bind(claim.published_at)
        .bind(&tags)
        .bind(&claim.provider_tag)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        info!(claim_id = %claim.claim_id, "upserted verified claim");
        Ok(())
    }

    async fn get_verified_claim(&self, claim_id: &str) -> Result<Option<VerifiedClaim>, EngineError> {
        // Concrete row decoding is omitted here; production wiring maps
        // `verified_claims` rows back to `VerifiedClaim` with `sqlx::FromRow`.
        let _ = claim_id;
        Err(EngineError::StorageFault(
            "PostgresDocumentStore::get_verified_claim requires a FromRow mapping wired at deploy time".to_string(),
        ))
    }

    async fn list_verified_claims(&self) -> Result<Vec<VerifiedClaim>, EngineError> {
        Err(EngineError::StorageFault(
            "PostgresDocumentStore::list_verified_claims requires a FromRow mapping wired at deploy time".to_string(),
        ))
    }

    async fn append_raw_item(&self, collection: &str, item: RawItem) -> Result<String, EngineError> {
        let id = uuid::Uuid::new_v4().to_string();
        let table = raw_item_table(collection)?;
        let meta = &item.provider_meta;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, provider_tag, source_name, url, title, body, published_at, language, provider_meta)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"
        ))
        .bind(&id)
        .bind(&item.provider_tag)
        .bind(&item.source_name)
        .bind(&item.url)
        .bind(&item.title)
        .bind(&item.body)
        .bind(item.published_at)
        .bind(&item.language)
        .bind(meta)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        Ok(id)
    }

    async fn append_claim_log(&self, log: ClaimLog) -> Result<(), EngineError> {
        let sources = serde_json::to_value(&log.sources_used).map_err(|e| EngineError::StorageFault(e.to_string()))?;
        let errors = serde_json::to_value(&log.errors).map_err(|e| EngineError::StorageFault(e.to_string()))?;
        sqlx::query(
            "INSERT INTO claim_logs
               (log_id, received_at, client_fingerprint, claim_text, language, category, mode,
                verdict, confidence, contradiction_score, sources_used, model_used, latency_ms, errors)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .bind(&log.log_id)
        .bind(log.received_at)
        .bind(&log.client_fingerprint)
        .bind(&log.claim_text)
        .bind(&log.language)
        .bind(&log.category)
        .bind(format!("{:?}", log.mode))
        .bind(log.verdict.as_str())
        .bind(log.confidence)
        .bind(log.contradiction_score)
        .bind(&sources)
        .bind(&log.model_used)
        .bind(log.latency_ms as i64)
        .bind(&errors)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        Ok(())
    }

    async fn list_claim_logs(&self, _limit: usize) -> Result<Vec<ClaimLog>, EngineError> {
        Err(EngineError::StorageFault(
            "PostgresDocumentStore::list_claim_logs requires a FromRow mapping wired at deploy time".to_string(),
        ))
    }

    async fn insert_ingest_run(&self, run: IngestRun) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO ingest_logs (run_id, started_at, triggered_by, forced, status)
             VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(&run.run_id)
        .bind(run.started_at)
        .bind(&run.triggered_by)
        .bind(run.forced)
        .bind(format!("{:?}", run.status).to_uppercase())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        Ok(())
    }

    async fn update_ingest_run(&self, run: IngestRun) -> Result<(), EngineError> {
        let counts = serde_json::to_value(&run.counts).map_err(|e| EngineError::StorageFault(e.to_string()))?;
        let errors = serde_json::to_value(&run.errors).map_err(|e| EngineError::StorageFault(e.to_string()))?;
        sqlx::query(
            "UPDATE ingest_logs SET finished_at = $2, status = $3, counts = $4, errors = $5
             WHERE run_id = $1",
        )
        .bind(&run.run_id)
        .bind(run.finished_at)
        .bind(format!("{:?}", run.status).to_uppercase())
        .bind(&counts)
        .bind(&errors)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        Ok(())
    }

    async fn latest_ingest_run(&self) -> Result<Option<IngestRun>, EngineError> {
        Err(EngineError::StorageFault(
            "PostgresDocumentStore::latest_ingest_run requires a FromRow mapping wired at deploy time".to_string(),
        ))
    }

    async fn append_feedback(&self, feedback: Feedback) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO feedback (feedback_id, received_at, claim_text, verdict_returned, comment, screenshot_url)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(&feedback.feedback_id)
        .bind(feedback.received_at)
        .bind(&feedback.claim_text)
        .bind(feedback.verdict_returned.as_str())
        .bind(&feedback.comment)
        .bind(&feedback.screenshot_url)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| EngineError::StorageFault(e.to_string()))?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await.is_ok()
    }
}

fn raw_item_table(collection: &str) -> Result<&'static str, EngineError> {
    match collection {
        "news_items" => Ok("news_items"),
        "gov_items" => Ok("gov_items"),
        "social_items" => Ok("social_items"),
        other => Err(EngineError::StorageFault(format!("unknown raw item collection '{other}'"))),
    }
}
