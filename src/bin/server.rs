//! Binary entry point: loads configuration, installs the tracing
//! subscriber, wires every component, and serves the axum router.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use verity_engine::api::{router, AppState};
use verity_engine::config::AppConfig;
use verity_engine::connectors::{FakeFactCheckConnector, FakeGovConnector, FakeNewsConnector, FakeSocialConnector};
use verity_engine::document_store::InMemoryDocumentStore;
use verity_engine::embeddings::{DeterministicEmbeddingProvider, EmbeddingGateway, HttpEmbeddingProvider};
use verity_engine::gateway::{LocalBackend, ModelGateway, RemoteBackend};
use verity_engine::ingest::IngestOrchestrator;
use verity_engine::resilience::RetryConfig;
use verity_engine::vector_index::InMemoryVectorIndex;
use verity_engine::verify::VerifyEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let document_store = Arc::new(InMemoryDocumentStore::new());
    let vector_index = Arc::new(InMemoryVectorIndex::new());

    let mut embedding_providers: Vec<Arc<dyn verity_engine::embeddings::EmbeddingProvider>> = Vec::new();
    if let Some(endpoint) = &config.model_backends.ollama_endpoint {
        if !config.model_backends.force_offline {
            embedding_providers.push(Arc::new(HttpEmbeddingProvider::new(
                endpoint.clone(),
                "embeddinggemma",
                config.embeddings.dimension,
            )));
        }
    }
    embedding_providers.push(Arc::new(DeterministicEmbeddingProvider::new(config.embeddings.dimension)));
    let embedding_gateway = Arc::new(EmbeddingGateway::new(embedding_providers));

    let mut backends: Vec<Arc<dyn verity_engine::gateway::ModelBackend>> = Vec::new();
    if !config.model_backends.force_offline {
        if let Some(key) = &config.model_backends.gemini_api_key {
            backends.push(Arc::new(RemoteBackend::new(
                "gemini",
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                key.clone(),
                "gemini-1.5-flash",
            )));
        }
        if let Some(key) = &config.model_backends.openrouter_api_key {
            backends.push(Arc::new(RemoteBackend::new(
                "openrouter",
                "https://openrouter.ai/api/v1/chat/completions",
                key.clone(),
                "meta-llama/llama-3.1-8b-instruct",
            )));
        }
    }
    if let Some(endpoint) = &config.model_backends.ollama_endpoint {
        backends.push(Arc::new(LocalBackend::new("ollama", endpoint.clone(), "llama3.1")));
    }
    if backends.is_empty() {
        tracing::warn!("no model backends configured; /verify will return AllBackendsDown for reasoned requests");
    }
    let model_gateway = Arc::new(ModelGateway::new(backends, RetryConfig::default()));

    let news_connector: Arc<dyn verity_engine::connectors::SourceConnector> = Arc::new(FakeNewsConnector::default());
    let factcheck_connector: Arc<dyn verity_engine::connectors::SourceConnector> = Arc::new(FakeFactCheckConnector::default());
    let connectors: Vec<Arc<dyn verity_engine::connectors::SourceConnector>> = vec![
        news_connector.clone(),
        Arc::new(FakeGovConnector::default()),
        factcheck_connector.clone(),
        Arc::new(FakeSocialConnector::default()),
    ];

    let ingest_orchestrator = Arc::new(IngestOrchestrator::new(
        connectors,
        document_store.clone(),
        embedding_gateway.clone(),
        vector_index.clone(),
        config.ingestion.clone(),
    ));

    let verify_engine = Arc::new(VerifyEngine::new(
        document_store.clone(),
        vector_index.clone(),
        embedding_gateway.clone(),
        model_gateway.clone(),
        news_connector,
        factcheck_connector,
        config.retrieval.clone(),
        config.request_deadline.clone(),
    ));

    let state = Arc::new(AppState {
        verify_engine,
        ingest_orchestrator,
        document_store,
        model_gateway: model_gateway.clone(),
        admin_token: config.admin_token.clone(),
    });

    {
        let gateway = model_gateway.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                gateway.sample_health().await;
            }
        });
    }

    let app = router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("verity-server listening on 0.0.0.0:8080");
    axum::serve(listener, app).await?;

    Ok(())
}
