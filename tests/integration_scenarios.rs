//! End-to-end scenarios exercising `VerifyEngine` and `IngestOrchestrator`
//! against in-memory fakes, covering spec §8's scenario catalog.

use std::sync::Arc;

use verity_engine::config::{IngestionConfig, RequestDeadlineConfig, RetrievalConfig};
use verity_engine::connectors::{FakeFactCheckConnector, FakeGovConnector, FakeNewsConnector, FakeSocialConnector};
use verity_engine::document_store::{DocumentStore, InMemoryDocumentStore};
use verity_engine::embeddings::{DeterministicEmbeddingProvider, EmbeddingGateway};
use verity_engine::error::EngineError;
use verity_engine::gateway::ModelGateway;
use verity_engine::ingest::{IngestOrchestrator, IngestRejection, IngestRunError};
use verity_engine::models::VerifyMode;
use verity_engine::resilience::RetryConfig;
use verity_engine::vector_index::{InMemoryVectorIndex, VectorIndex};
use verity_engine::verify::{VerifyEngine, VerifyRequest};

/// A `SourceConnector` that always returns zero items, used as the live
/// news/factcheck feed in scenarios that assert on retrieval from the
/// vector index alone and shouldn't also pick up connector-fresh items.
struct NoopConnector;

#[async_trait::async_trait]
impl verity_engine::connectors::SourceConnector for NoopConnector {
    fn provider_tag(&self) -> &str {
        "noop"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<verity_engine::models::RawItem>> {
        Ok(Vec::new())
    }
}

fn noop_live_connectors() -> (Arc<dyn verity_engine::connectors::SourceConnector>, Arc<dyn verity_engine::connectors::SourceConnector>) {
    (Arc::new(NoopConnector), Arc::new(NoopConnector))
}

const DIMENSION: usize = 32;

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        min_similarity: 0.0,
        canon_similarity: 0.85,
        context_budget: 10,
        snippet_chars: 300,
    }
}

fn deadline_config() -> RequestDeadlineConfig {
    RequestDeadlineConfig {
        online_secs: 5,
        offline_secs: 5,
    }
}

fn build_orchestrator(
    document_store: Arc<InMemoryDocumentStore>,
    vector_index: Arc<InMemoryVectorIndex>,
    embedding_gateway: Arc<EmbeddingGateway>,
) -> IngestOrchestrator {
    let connectors: Vec<Arc<dyn verity_engine::connectors::SourceConnector>> = vec![
        Arc::new(FakeNewsConnector::default()),
        Arc::new(FakeGovConnector::default()),
        Arc::new(FakeFactCheckConnector::default()),
        Arc::new(FakeSocialConnector::default()),
    ];
    IngestOrchestrator::new(
        connectors,
        document_store,
        embedding_gateway,
        vector_index,
        IngestionConfig {
            chunk_size: 400,
            chunk_overlap: 50,
            cooldown_secs: 600,
            connector_deadline_secs: 5,
            embed_batch_size: 8,
        },
    )
}

// S1: a fresh ingestion run with no prior canon data populates every
// evidence collection and completes as Ok.
#[tokio::test]
async fn s1_ingestion_run_populates_collections_and_completes_ok() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));

    let orchestrator = build_orchestrator(document_store.clone(), vector_index.clone(), embedding_gateway);
    let run = orchestrator.run("test", true).await.unwrap();

    assert_eq!(run.status, verity_engine::models::IngestStatus::Ok);
    assert!(run.counts.news >= 1);
    assert!(run.counts.gov >= 1);
    assert!(run.counts.factcheck >= 1);
    assert!(run.counts.social >= 1);

    let claims = document_store.list_verified_claims().await.unwrap();
    assert_eq!(claims.len(), 1);
}

// S2: a second ingestion run immediately after the first is rejected by the
// cooldown window unless forced.
#[tokio::test]
async fn s2_ingestion_respects_cooldown_unless_forced() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));
    let orchestrator = build_orchestrator(document_store, vector_index, embedding_gateway);

    orchestrator.run("test", false).await.unwrap();
    let second = orchestrator.run("test", false).await;
    assert!(matches!(second, Err(IngestRunError::Rejected(IngestRejection::Cooldown))));

    let forced = orchestrator.run("test", true).await;
    assert!(forced.is_ok());
}

// S2b: a run requested while one is already in flight is rejected for a
// different reason than a cooldown rejection.
#[tokio::test]
async fn s2b_ingestion_rejects_concurrent_run_as_already_running() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));
    let orchestrator = Arc::new(build_orchestrator(document_store, vector_index, embedding_gateway));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run("test", true).await })
    };
    // give the first run a chance to flip the running flag before we try a
    // second one; the orchestrator itself provides no other synchronization
    // point to hook into from outside.
    tokio::task::yield_now().await;
    let second = orchestrator.run("test", true).await;

    let _ = first.await;
    if let Err(error) = second {
        assert!(matches!(error, IngestRunError::Rejected(IngestRejection::AlreadyRunning)));
    }
}

// S3: a claim matching a previously ingested fact-check hits the canon
// lookup path (Phase 1) rather than reasoned verification.
#[tokio::test]
async fn s3_known_claim_takes_canon_lookup_path() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));

    let claim_text = "drinking bleach cures the common cold";
    let (vectors, _) = embedding_gateway.embed_batch(&[claim_text.to_string()]).await.unwrap();

    vector_index
        .upsert(
            "verified_claims",
            verity_engine::models::KBRecord {
                record_id: "claim-1".to_string(),
                vector: vectors[0].clone(),
                text: "False: there is no evidence that drinking bleach cures illness.".to_string(),
                metadata: verity_engine::models::KBMetadata {
                    kind: verity_engine::models::SourceKind::Factcheck,
                    source_name: "PolitiFact".to_string(),
                    url: Some("https://example.com/claim-1".to_string()),
                    published_at: None,
                    title: None,
                    credibility_score: 0.9,
                    credibility_level: verity_engine::models::CredibilityLevel::High,
                    is_verified_source: true,
                    canon_verdict: Some(verity_engine::models::CanonVerdict::False),
                },
            },
        )
        .await
        .unwrap();

    let model_gateway = Arc::new(ModelGateway::new(vec![], RetryConfig::default()));
    let (live_news, live_factcheck) = noop_live_connectors();
    let engine = VerifyEngine::new(
        document_store,
        vector_index,
        embedding_gateway,
        model_gateway,
        live_news,
        live_factcheck,
        retrieval_config(),
        deadline_config(),
    );

    let response = engine
        .verify(VerifyRequest {
            claim_text: claim_text.to_string(),
            language: "en".to_string(),
            category: None,
            client_fingerprint: "tester".to_string(),
        })
        .await
        .unwrap();

    assert!(matches!(response.mode, VerifyMode::ExistingFactCheck));
    assert!(matches!(response.verdict, verity_engine::models::Verdict::False));
}

// S4: an unrecognized claim with zero evidence in the vector index is
// reasoned as unverified rather than hallucinated or refused outright.
#[tokio::test]
async fn s4_claim_with_no_evidence_is_reasoned_as_unverified() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));
    let model_gateway = Arc::new(ModelGateway::new(vec![], RetryConfig::default()));

    let mut retrieval = retrieval_config();
    retrieval.min_similarity = 0.99;

    let (live_news, live_factcheck) = noop_live_connectors();
    let engine = VerifyEngine::new(
        document_store,
        vector_index,
        embedding_gateway,
        model_gateway,
        live_news,
        live_factcheck,
        retrieval,
        deadline_config(),
    );

    let response = engine
        .verify(VerifyRequest {
            claim_text: "an entirely novel claim nobody has evidence about".to_string(),
            language: "en".to_string(),
            category: None,
            client_fingerprint: "tester".to_string(),
        })
        .await
        .unwrap();

    assert!(matches!(response.mode, VerifyMode::Reasoned));
    assert!(matches!(response.verdict, verity_engine::models::Verdict::Unverified));
    assert!(response.confidence <= 0.3);
}

// S5: with evidence present but every model backend down, verification
// surfaces AllBackendsDown rather than a fabricated verdict.
#[tokio::test]
async fn s5_evidence_present_but_all_backends_down() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));

    let (vectors, _) = embedding_gateway.embed_batch(&["council approves water budget".to_string()]).await.unwrap();
    vector_index
        .upsert(
            "news_items",
            verity_engine::models::KBRecord {
                record_id: "news-1".to_string(),
                vector: vectors[0].clone(),
                text: "The council approved the water treatment budget Tuesday.".to_string(),
                metadata: verity_engine::models::KBMetadata {
                    kind: verity_engine::models::SourceKind::News,
                    source_name: "Reuters".to_string(),
                    url: Some("https://example.com/news-1".to_string()),
                    published_at: None,
                    title: None,
                    credibility_score: 0.8,
                    credibility_level: verity_engine::models::CredibilityLevel::MediumHigh,
                    is_verified_source: false,
                    canon_verdict: None,
                },
            },
        )
        .await
        .unwrap();

    let model_gateway = Arc::new(ModelGateway::new(vec![], RetryConfig::default()));
    let (live_news, live_factcheck) = noop_live_connectors();
    let engine = VerifyEngine::new(
        document_store,
        vector_index,
        embedding_gateway,
        model_gateway,
        live_news,
        live_factcheck,
        retrieval_config(),
        deadline_config(),
    );

    let result = engine
        .verify(VerifyRequest {
            claim_text: "council approves water budget".to_string(),
            language: "en".to_string(),
            category: None,
            client_fingerprint: "tester".to_string(),
        })
        .await;

    assert!(matches!(result, Err(EngineError::AllBackendsDown)));
}

// S6: empty claim text is rejected before any retrieval or model call.
#[tokio::test]
async fn s6_empty_claim_is_input_invalid() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));
    let model_gateway = Arc::new(ModelGateway::new(vec![], RetryConfig::default()));

    let (live_news, live_factcheck) = noop_live_connectors();
    let engine = VerifyEngine::new(
        document_store,
        vector_index,
        embedding_gateway,
        model_gateway,
        live_news,
        live_factcheck,
        retrieval_config(),
        deadline_config(),
    );

    let result = engine
        .verify(VerifyRequest {
            claim_text: "   ".to_string(),
            language: "en".to_string(),
            category: None,
            client_fingerprint: "tester".to_string(),
        })
        .await;

    assert!(matches!(result, Err(EngineError::InputInvalid(_))));
}

// S6b: a non-empty claim shorter than the minimum checkable length is
// rejected the same way as an empty one.
#[tokio::test]
async fn s6b_too_short_claim_is_input_invalid() {
    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    let embedding_gateway = Arc::new(EmbeddingGateway::new(vec![Arc::new(
        DeterministicEmbeddingProvider::new(DIMENSION),
    )]));
    let model_gateway = Arc::new(ModelGateway::new(vec![], RetryConfig::default()));

    let (live_news, live_factcheck) = noop_live_connectors();
    let engine = VerifyEngine::new(
        document_store,
        vector_index,
        embedding_gateway,
        model_gateway,
        live_news,
        live_factcheck,
        retrieval_config(),
        deadline_config(),
    );

    let result = engine
        .verify(VerifyRequest {
            claim_text: "too short".to_string(),
            language: "en".to_string(),
            category: None,
            client_fingerprint: "tester".to_string(),
        })
        .await;

    assert!(matches!(result, Err(EngineError::InputInvalid(_))));
}
