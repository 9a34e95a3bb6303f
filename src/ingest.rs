//! Ingestion Orchestrator (C6, spec §4.6). Singleton-gated so at most one
//! ingestion run is in flight at a time, fans out to connectors with a
//! per-connector deadline, then chunks, dedupes, embeds, and persists each
//! connector's output. Grounded in `indexers::job_scheduler::JobScheduler`'s
//! `try_acquire`-style concurrency gate, simplified from a per-job-type cap
//! table to a single global singleton gate since only one ingestion run
//! makes sense at a time for this engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker;
use crate::config::IngestionConfig;
use crate::connectors::SourceConnector;
use crate::credibility;
use crate::dedupe;
use crate::document_store::DocumentStore;
use crate::embeddings::EmbeddingGateway;
use crate::error::EngineError;
use crate::vector_index::VectorIndex;
use crate::models::{
    CanonVerdict, ConnectorError, IngestCounts, IngestRun, IngestStatus, KBMetadata, KBRecord,
    RawItem, SourceKind, VerifiedClaim,
};

/// Why a requested ingestion run was rejected without starting (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestRejection {
    /// A run is already in flight.
    AlreadyRunning,
    /// The cooldown window since the last completed run hasn't elapsed.
    Cooldown,
}

impl IngestRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestRejection::AlreadyRunning => "already_running",
            IngestRejection::Cooldown => "cooldown",
        }
    }
}

/// `IngestOrchestrator::run`'s error type: either the run was rejected
/// before starting, or it started and an engine-level failure occurred.
#[derive(Debug, thiserror::Error)]
pub enum IngestRunError {
    #[error("ingest run rejected: {0:?}")]
    Rejected(IngestRejection),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Normalizes a fact-check provider's free-text rating into the canon
/// verdict taxonomy (spec §4.6). Unrecognized ratings default to
/// `Misleading` rather than being dropped, on the theory that a
/// fact-checker publishing a claim at all means it warranted scrutiny.
fn normalize_factcheck_rating(rating: &str) -> CanonVerdict {
    match rating.trim().to_lowercase().as_str() {
        "true" | "correct" | "accurate" => CanonVerdict::True,
        "false" | "incorrect" | "pants on fire" => CanonVerdict::False,
        _ => CanonVerdict::Misleading,
    }
}

fn collection_for(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::News => "news_items",
        SourceKind::Gov => "gov_items",
        SourceKind::Factcheck => "news_items",
        SourceKind::Social => "social_items",
    }
}

pub struct IngestOrchestrator {
    connectors: Vec<Arc<dyn SourceConnector>>,
    document_store: Arc<dyn DocumentStore>,
    embedding_gateway: Arc<EmbeddingGateway>,
    vector_index: Arc<dyn VectorIndex>,
    config: IngestionConfig,
    running: Mutex<bool>,
    last_run_finished: Mutex<Option<Instant>>,
    /// URL-keyed dedup set, persisted across runs: once a URL has been
    /// ingested it is never re-ingested, even in a later run.
    seen_urls: Mutex<HashSet<String>>,
    /// Content-hash dedup set, reset at the start of every run: catches
    /// duplicate bodies published under different URLs within one run, but
    /// doesn't permanently block a URL-less item from ever reappearing.
    seen_content: Mutex<HashSet<String>>,
}

impl IngestOrchestrator {
    pub fn new(
        connectors: Vec<Arc<dyn SourceConnector>>,
        document_store: Arc<dyn DocumentStore>,
        embedding_gateway: Arc<EmbeddingGateway>,
        vector_index: Arc<dyn VectorIndex>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            connectors,
            document_store,
            embedding_gateway,
            vector_index,
            config,
            running: Mutex::new(false),
            last_run_finished: Mutex::new(None),
            seen_urls: Mutex::new(HashSet::new()),
            seen_content: Mutex::new(HashSet::new()),
        }
    }

    /// Attempt to start a run. Rejects with `IngestRejection::AlreadyRunning`
    /// if a run is already in progress, and (unless `forced`) with
    /// `IngestRejection::Cooldown` if the cooldown window since the last
    /// completed run hasn't elapsed.
    pub async fn run(&self, triggered_by: &str, forced: bool) -> Result<IngestRun, IngestRunError> {
        {
            let mut running = self.running.lock();
            if *running {
                return Err(IngestRunError::Rejected(IngestRejection::AlreadyRunning));
            }
            if !forced {
                if let Some(last) = *self.last_run_finished.lock() {
                    let cooldown = Duration::from_secs(self.config.cooldown_secs);
                    if last.elapsed() < cooldown {
                        return Err(IngestRunError::Rejected(IngestRejection::Cooldown));
                    }
                }
            }
            *running = true;
        }

        self.seen_content.lock().clear();

        let result = self.execute_run(triggered_by, forced).await;

        *self.running.lock() = false;
        *self.last_run_finished.lock() = Some(Instant::now());

        result.map_err(IngestRunError::from)
    }

    async fn execute_run(&self, triggered_by: &str, forced: bool) -> Result<IngestRun, EngineError> {
        let run_id = Uuid::new_v4().to_string();
        let mut run = IngestRun {
            run_id: run_id.clone(),
            started_at: chrono::Utc::now(),
            finished_at: None,
            triggered_by: triggered_by.to_string(),
            forced,
            status: IngestStatus::Running,
            counts: IngestCounts::default(),
            errors: Vec::new(),
        };
        self.document_store.insert_ingest_run(run.clone()).await?;
        info!(run_id = %run_id, "ingestion run started");

        let deadline = Duration::from_secs(self.config.connector_deadline_secs);

        for connector in &self.connectors {
            match tokio::time::timeout(deadline, connector.fetch()).await {
                Ok(Ok(items)) => {
                    if let Err(error) = self.process_items(items, &mut run.counts).await {
                        warn!(connector = connector.provider_tag(), %error, "connector processing failed");
                        run.errors.push(ConnectorError {
                            connector: connector.provider_tag().to_string(),
                            message: error.to_string(),
                        });
                    }
                }
                Ok(Err(error)) => {
                    warn!(connector = connector.provider_tag(), %error, "connector fetch failed");
                    run.errors.push(ConnectorError {
                        connector: connector.provider_tag().to_string(),
                        message: error.to_string(),
                    });
                }
                Err(_) => {
                    warn!(connector = connector.provider_tag(), "connector fetch timed out");
                    run.errors.push(ConnectorError {
                        connector: connector.provider_tag().to_string(),
                        message: "fetch deadline exceeded".to_string(),
                    });
                }
            }
        }

        run.finished_at = Some(chrono::Utc::now());
        run.status = if run.errors.is_empty() {
            IngestStatus::Ok
        } else if run.errors.len() < self.connectors.len() {
            IngestStatus::Partial
        } else {
            IngestStatus::Failed
        };

        self.document_store.update_ingest_run(run.clone()).await?;
        info!(run_id = %run_id, status = ?run.status, "ingestion run finished");
        Ok(run)
    }

    async fn process_items(&self, items: Vec<RawItem>, counts: &mut IngestCounts) -> anyhow::Result<()> {
        for item in items {
            item.validate().map_err(|e| anyhow::anyhow!(e))?;

            let is_duplicate = match item.url.as_deref().and_then(dedupe::url_key) {
                Some(url_key) => {
                    let mut seen = self.seen_urls.lock();
                    if seen.contains(&url_key) {
                        true
                    } else {
                        seen.insert(url_key);
                        false
                    }
                }
                None => {
                    let content_key = dedupe::content_key(&item.body);
                    let mut seen = self.seen_content.lock();
                    if seen.contains(&content_key) {
                        true
                    } else {
                        seen.insert(content_key);
                        false
                    }
                }
            };
            if is_duplicate {
                continue;
            }

            if item.kind == SourceKind::Factcheck {
                self.persist_factcheck_claim(&item).await?;
            }

            let collection = collection_for(item.kind);
            let raw_id = self
                .document_store
                .append_raw_item(collection, item.clone())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;

            let chunks = chunker::chunk(&item, &raw_id, self.config.chunk_size, self.config.chunk_overlap);
            self.embed_and_index(collection, &item, &chunks).await?;

            match item.kind {
                SourceKind::News => counts.news += 1,
                SourceKind::Gov => counts.gov += 1,
                SourceKind::Factcheck => counts.factcheck += 1,
                SourceKind::Social => counts.social += 1,
            }
        }
        Ok(())
    }

    async fn persist_factcheck_claim(&self, item: &RawItem) -> anyhow::Result<()> {
        let rating = item
            .provider_meta
            .get("rating")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let verdict = normalize_factcheck_rating(rating);
        let claim = VerifiedClaim {
            claim_id: Uuid::new_v4().to_string(),
            claim_text: item.title.clone().unwrap_or_else(|| item.body.chars().take(120).collect()),
            normalized_claim_text: item.body.trim().to_lowercase(),
            verdict,
            explanation: item.body.clone(),
            source_url: item.url.clone().unwrap_or_default(),
            publisher: item.source_name.clone(),
            language: item.language.clone().unwrap_or_else(|| "en".to_string()),
            published_at: item.published_at,
            tags: Vec::new(),
            provider_tag: item.provider_tag.clone(),
        };
        self.document_store
            .upsert_verified_claim(claim.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        self.index_canon_claim(item, &claim, verdict).await
    }

    /// Embed a fact-checked claim and upsert it into the `verified_claims`
    /// vector collection carrying its adjudicated verdict, so Phase 1 canon
    /// lookup (`verify::phase1_canon_lookup`) can find and return it.
    async fn index_canon_claim(&self, item: &RawItem, claim: &VerifiedClaim, verdict: CanonVerdict) -> anyhow::Result<()> {
        let (vectors, identity) = self
            .embedding_gateway
            .embed_batch(&[claim.claim_text.clone()])
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        let vector = vectors.into_iter().next().expect("batch of one returns one vector");

        if !self.vector_index.record_provider_identity("verified_claims", identity.clone()) {
            warn!(collection = "verified_claims", model = %identity.model_name, "embedding provider mismatch on canon claim index");
        }

        let (level, score, verified) = credibility::classify_metadata(&item.source_name, item.kind);
        let record = KBRecord {
            record_id: claim.claim_id.clone(),
            vector,
            text: claim.explanation.clone(),
            metadata: KBMetadata {
                kind: item.kind,
                source_name: item.source_name.clone(),
                url: item.url.clone(),
                published_at: item.published_at,
                title: item.title.clone(),
                credibility_score: score,
                credibility_level: level,
                is_verified_source: verified,
                canon_verdict: Some(verdict),
            },
        };
        self.vector_index
            .upsert("verified_claims", record)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn embed_and_index(
        &self,
        collection: &str,
        item: &RawItem,
        chunks: &[crate::models::Chunk],
    ) -> anyhow::Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        for batch in texts.chunks(self.config.embed_batch_size.max(1)) {
            let batch_chunks = &chunks[..batch.len()];
            let (vectors, identity) = self
                .embedding_gateway
                .embed_batch(&batch.to_vec())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;

            if !self.vector_index.record_provider_identity(collection, identity.clone()) {
                warn!(collection, model = %identity.model_name, "embedding provider mismatch on ingest");
            }

            let (level, score, verified) = credibility::classify_metadata(&item.source_name, item.kind);
            for (chunk, vector) in batch_chunks.iter().zip(vectors) {
                let metadata = KBMetadata {
                    kind: item.kind,
                    source_name: item.source_name.clone(),
                    url: item.url.clone(),
                    published_at: item.published_at,
                    title: item.title.clone(),
                    credibility_score: score,
                    credibility_level: level,
                    is_verified_source: verified,
                    canon_verdict: None,
                };
                let record = KBRecord {
                    record_id: chunk.chunk_id.clone(),
                    vector,
                    text: chunk.text.clone(),
                    metadata,
                };
                self.vector_index
                    .upsert(collection, record)
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_ratings() {
        assert!(matches!(normalize_factcheck_rating("True"), CanonVerdict::True));
        assert!(matches!(normalize_factcheck_rating("false"), CanonVerdict::False));
        assert!(matches!(normalize_factcheck_rating("Pants on Fire"), CanonVerdict::False));
    }

    #[test]
    fn unknown_rating_defaults_to_misleading() {
        assert!(matches!(normalize_factcheck_rating("half-true"), CanonVerdict::Misleading));
        assert!(matches!(normalize_factcheck_rating(""), CanonVerdict::Misleading));
    }

    #[test]
    fn collection_routing_matches_source_kind() {
        assert_eq!(collection_for(SourceKind::News), "news_items");
        assert_eq!(collection_for(SourceKind::Gov), "gov_items");
        assert_eq!(collection_for(SourceKind::Social), "social_items");
    }
}
