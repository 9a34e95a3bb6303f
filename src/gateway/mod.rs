//! Model Gateway (C7): a preference-ordered chain of heterogeneous LLM
//! backends with per-backend retry, circuit breaking, and an out-of-band
//! health sampler. Backends are probed sequentially, never in parallel,
//! because each probe can consume paid quota (spec §4.7). Grounded in
//! `resilience::retry`/`resilience::circuit_breaker` for the resilience
//! primitives and `embedding-service::provider` for the "ordered chain of
//! trait objects, short-circuit on first success" shape already used by C2.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, HealthStatus, Retriable, RetryConfig, RetryExecutor};

/// A backend call failure, classified so the retry executor can tell a
/// transient hiccup (worth retrying within the same backend) from a
/// permanent one (skip straight to the next backend without burning retry
/// budget).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Network error, timeout, HTTP 408/429, or 5xx: the same request might
    /// succeed on a second try.
    #[error("{0}")]
    Retriable(String),
    /// Other 4xx, malformed response body, or auth failure: retrying the
    /// identical request will fail the same way.
    #[error("{0}")]
    NonRetriable(String),
}

impl Retriable for BackendError {
    fn is_retriable(&self) -> bool {
        matches!(self, BackendError::Retriable(_))
    }
}

/// Classify an HTTP response status into a `BackendError` once its body has
/// already been read as `message`.
fn classify_status(status: reqwest::StatusCode, message: String) -> BackendError {
    if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
        BackendError::Retriable(message)
    } else {
        BackendError::NonRetriable(message)
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> BackendError {
    let retriable = error.is_timeout()
        || error.is_connect()
        || error.status().map(|s| s.is_server_error() || s.as_u16() == 408 || s.as_u16() == 429).unwrap_or(false);
    if retriable {
        BackendError::Retriable(error.to_string())
    } else {
        BackendError::NonRetriable(error.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub deadline: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
            deadline: Duration::from_secs(15),
        }
    }
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn id(&self) -> &str;
    async fn generate(&self, system: &str, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError>;
    async fn health_check(&self) -> bool;
}

/// A remote backend speaking an OpenAI/Gemini/OpenRouter-style chat
/// completion endpoint.
pub struct RemoteBackend {
    id: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl RemoteBackend {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for RemoteBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, system: &str, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(options.deadline)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("backend '{}' returned {}", self.id, status);
            return Err(classify_status(status, message));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::NonRetriable(format!("backend '{}' returned malformed JSON: {e}", self.id)))?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BackendError::NonRetriable(format!("backend '{}' response missing message content", self.id)))
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// A local backend speaking Ollama's `/api/generate`.
pub struct LocalBackend {
    id: String,
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl LocalBackend {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for LocalBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, system: &str, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": format!("{system}\n\n{prompt}"),
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .timeout(options.deadline)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("local backend '{}' returned {}", self.id, status);
            return Err(classify_status(status, message));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            BackendError::NonRetriable(format!("local backend '{}' returned malformed JSON: {e}", self.id))
        })?;
        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BackendError::NonRetriable(format!("local backend '{}' response missing 'response' field", self.id)))
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

struct Entry {
    backend: Arc<dyn ModelBackend>,
    breaker: CircuitBreaker,
}

/// Preference-ordered backend chain. Each `generate` call walks backends in
/// order, skipping any whose circuit is open, retrying within a backend
/// before moving to the next.
pub struct ModelGateway {
    entries: Vec<Entry>,
    retry_config: RetryConfig,
    health: RwLock<HashMap<String, HealthStatus>>,
}

impl ModelGateway {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>, retry_config: RetryConfig) -> Self {
        let entries = backends
            .into_iter()
            .map(|backend| {
                let breaker = CircuitBreaker::new(CircuitBreakerConfig {
                    name: backend.id().to_string(),
                    ..CircuitBreakerConfig::default()
                });
                Entry { backend, breaker }
            })
            .collect();
        Self {
            entries,
            retry_config,
            health: RwLock::new(HashMap::new()),
        }
    }

    pub async fn generate(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<(String, String), EngineError> {
        for entry in &self.entries {
            if !entry.breaker.allow() {
                warn!(backend = entry.backend.id(), "skipping backend, circuit open");
                continue;
            }

            let executor = RetryExecutor::new(self.retry_config.clone());
            let backend = entry.backend.clone();
            let system_owned = system.to_string();
            let prompt_owned = prompt.to_string();
            let options_owned = options.clone();

            let result = executor
                .execute(|| {
                    let backend = backend.clone();
                    let system = system_owned.clone();
                    let prompt = prompt_owned.clone();
                    let options = options_owned.clone();
                    async move { backend.generate(&system, &prompt, &options).await }
                })
                .await;

            match result {
                Ok(text) => {
                    entry.breaker.record_success();
                    info!(backend = entry.backend.id(), "generate succeeded");
                    return Ok((text, entry.backend.id().to_string()));
                }
                Err(error) => {
                    entry.breaker.record_failure();
                    warn!(backend = entry.backend.id(), %error, "backend exhausted retries, trying next");
                }
            }
        }
        Err(EngineError::AllBackendsDown)
    }

    /// Out-of-band health sampling, intended to be driven by a periodic
    /// background task rather than inline with request handling so a slow
    /// health probe never adds latency to `/verify`.
    pub async fn sample_health(&self) {
        for entry in &self.entries {
            let healthy = entry.backend.health_check().await;
            let status = if healthy { HealthStatus::Healthy } else { HealthStatus::Degraded };
            self.health.write().insert(entry.backend.id().to_string(), status);
        }
    }

    pub fn health_snapshot(&self) -> HashMap<String, HealthStatus> {
        self.health.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedBackend {
        id: String,
        fail_times: AtomicU32,
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn generate(&self, _system: &str, _prompt: &str, _options: &GenerateOptions) -> Result<String, BackendError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                Err(BackendError::Retriable("scripted failure".to_string()))
            } else {
                Ok(format!("response from {}", self.id))
            }
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct AlwaysNonRetriableBackend {
        id: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ModelBackend for AlwaysNonRetriableBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn generate(&self, _system: &str, _prompt: &str, _options: &GenerateOptions) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::NonRetriable("bad request".to_string()))
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn falls_through_to_next_backend_when_first_is_down() {
        let gateway = ModelGateway::new(
            vec![
                Arc::new(ScriptedBackend { id: "primary".into(), fail_times: AtomicU32::new(10) }),
                Arc::new(ScriptedBackend { id: "secondary".into(), fail_times: AtomicU32::new(0) }),
            ],
            fast_retry(),
        );
        let (text, backend_id) = gateway.generate("sys", "prompt", &GenerateOptions::default()).await.unwrap();
        assert_eq!(backend_id, "secondary");
        assert!(text.contains("secondary"));
    }

    #[tokio::test]
    async fn returns_all_backends_down_when_everything_fails() {
        let gateway = ModelGateway::new(
            vec![Arc::new(ScriptedBackend { id: "only".into(), fail_times: AtomicU32::new(100) })],
            fast_retry(),
        );
        let result = gateway.generate("sys", "prompt", &GenerateOptions::default()).await;
        assert!(matches!(result, Err(EngineError::AllBackendsDown)));
    }

    #[tokio::test]
    async fn non_retriable_backend_error_falls_through_without_exhausting_retry_budget() {
        let non_retriable = Arc::new(AlwaysNonRetriableBackend { id: "flaky-auth".into(), calls: AtomicU32::new(0) });
        let gateway = ModelGateway::new(
            vec![
                non_retriable.clone(),
                Arc::new(ScriptedBackend { id: "secondary".into(), fail_times: AtomicU32::new(0) }),
            ],
            RetryConfig { max_attempts: 5, initial_delay_ms: 1, max_delay_ms: 2, ..RetryConfig::default() },
        );
        let (_, backend_id) = gateway.generate("sys", "prompt", &GenerateOptions::default()).await.unwrap();
        assert_eq!(backend_id, "secondary");
        assert_eq!(non_retriable.calls.load(Ordering::SeqCst), 1, "non-retriable error should not be retried");
    }
}
