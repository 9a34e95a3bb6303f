//! Embedding provider abstraction and fallback gateway (C2). Grounded in
//! `embedding-service::provider::EmbeddingProvider`: the trait shape, the
//! per-call batch signature, and the deterministic hash-based fallback
//! provider are all carried over, generalized into an ordered chain instead
//! of a single concrete provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::EngineError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
    async fn health_check(&self) -> bool;
}

/// Remote embedding provider speaking an Ollama-style `/api/embeddings`
/// endpoint. Grounded in `embedding-service::provider::OllamaEmbeddingProvider`.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("failed to build embedding HTTP client"),
            base_url: base_url.into(),
            model_name: model_name.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn generate_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({ "model": self.model_name, "prompt": text });
            let response = self
                .client
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                anyhow::bail!("embedding endpoint returned {}", response.status());
            }
            let json: serde_json::Value = response.json().await?;
            let values = json["embedding"]
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("embedding response missing 'embedding' array"))?;
            let vector: Vec<f32> = values.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect();
            if vector.len() != self.dimension {
                anyhow::bail!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                );
            }
            out.push(vector);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Deterministic, dependency-free fallback provider used when every remote
/// and local provider is unavailable. Grounded in
/// `embedding-service::provider::DummyEmbeddingProvider`'s hash-based vector
/// construction.
pub struct DeterministicEmbeddingProvider {
    dimension: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbeddingProvider {
    async fn generate_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| hash_embedding(text, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "deterministic-fallback"
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    let hash = hasher.finish();

    (0..dimension)
        .map(|i| {
            let seed = hash.wrapping_add(i as u64);
            let normalized = (seed % 1000) as f32 / 1000.0;
            normalized * 2.0 - 1.0
        })
        .collect()
}

/// Which provider produced a batch, tracked per vector collection so a
/// collection is never silently mixed across providers with incompatible
/// embedding spaces (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub model_name: String,
    pub dimension: usize,
}

/// Ordered fallback chain over embedding providers: remote primary, remote
/// secondary, local, deterministic. The first provider that succeeds on the
/// whole batch wins; providers are never mixed within one batch.
pub struct EmbeddingGateway {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingGateway {
    pub fn new(providers: Vec<Arc<dyn EmbeddingProvider>>) -> Self {
        assert!(!providers.is_empty(), "embedding gateway requires at least one provider");
        Self { providers }
    }

    /// Generate embeddings for `texts` as one atomic batch, trying each
    /// provider in order. Returns the provider identity alongside the
    /// vectors so callers can detect a collection's embedding space
    /// changing between calls.
    pub async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Vec<f32>>, ProviderIdentity), EngineError> {
        for provider in &self.providers {
            match provider.generate_embeddings(texts).await {
                Ok(vectors) => {
                    info!(provider = provider.model_name(), count = vectors.len(), "embedding batch succeeded");
                    return Ok((
                        vectors,
                        ProviderIdentity {
                            model_name: provider.model_name().to_string(),
                            dimension: provider.dimension(),
                        },
                    ));
                }
                Err(error) => {
                    warn!(provider = provider.model_name(), %error, "embedding provider failed, trying next");
                }
            }
        }
        Err(EngineError::AllBackendsDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn generate_embeddings(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("always fails")
        }
        fn dimension(&self) -> usize {
            8
        }
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn health_check(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_failure() {
        let gateway = EmbeddingGateway::new(vec![
            Arc::new(FailingProvider),
            Arc::new(DeterministicEmbeddingProvider::new(8)),
        ]);
        let (vectors, identity) = gateway
            .embed_batch(&["hello".to_string(), "world".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(identity.model_name, "deterministic-fallback");
    }

    #[tokio::test]
    async fn returns_all_backends_down_when_every_provider_fails() {
        let gateway = EmbeddingGateway::new(vec![Arc::new(FailingProvider)]);
        let result = gateway.embed_batch(&["x".to_string()]).await;
        assert!(matches!(result, Err(EngineError::AllBackendsDown)));
    }

    #[tokio::test]
    async fn deterministic_provider_is_stable_across_calls() {
        let provider = DeterministicEmbeddingProvider::new(16);
        let a = provider.generate_embeddings(&["same text".to_string()]).await.unwrap();
        let b = provider.generate_embeddings(&["same text".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }
}
