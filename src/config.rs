//! Centralized configuration, loaded environment → defaults, validated eagerly
//! at startup. Grounded in `agent-agency-config`'s layered-loader idiom, scaled
//! down to the knobs this engine actually needs (no secrets vault, no
//! multi-environment profile switching).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model_backends: ModelBackendsConfig,
    pub embeddings: EmbeddingsConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionConfig,
    pub admin_token: Option<String>,
    pub cors_origins: Vec<String>,
    pub storage: StorageConfig,
    pub request_deadline: RequestDeadlineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBackendsConfig {
    pub gemini_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub ollama_endpoint: Option<String>,
    pub force_offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub min_similarity: f32,
    pub canon_similarity: f32,
    pub context_budget: usize,
    pub snippet_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub cooldown_secs: u64,
    pub connector_deadline_secs: u64,
    pub embed_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub mongodb_uri: Option<String>,
    pub chroma_persist_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDeadlineConfig {
    pub online_secs: u64,
    pub offline_secs: u64,
}

impl RequestDeadlineConfig {
    pub fn duration(&self, offline: bool) -> Duration {
        Duration::from_secs(if offline {
            self.offline_secs
        } else {
            self.online_secs
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_backends: ModelBackendsConfig {
                gemini_api_key: None,
                openrouter_api_key: None,
                ollama_endpoint: Some("http://localhost:11434".to_string()),
                force_offline: false,
            },
            embeddings: EmbeddingsConfig { dimension: 768 },
            retrieval: RetrievalConfig {
                min_similarity: 0.65,
                canon_similarity: 0.85,
                context_budget: 25,
                snippet_chars: 500,
            },
            ingestion: IngestionConfig {
                chunk_size: 800,
                chunk_overlap: 120,
                cooldown_secs: 600,
                connector_deadline_secs: 60,
                embed_batch_size: 32,
            },
            storage: StorageConfig {
                mongodb_uri: None,
                chroma_persist_path: None,
            },
            admin_token: None,
            cors_origins: vec![],
            request_deadline: RequestDeadlineConfig {
                online_secs: 15,
                offline_secs: 20,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.model_backends.gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        cfg.model_backends.openrouter_api_key = std::env::var("OPENROUTER_API_KEY").ok();
        if let Ok(v) = std::env::var("OLLAMA_ENDPOINT") {
            cfg.model_backends.ollama_endpoint = Some(v);
        }
        cfg.model_backends.force_offline = std::env::var("FORCE_OFFLINE_MODE")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        cfg.admin_token = std::env::var("X_ADMIN_TOKEN").ok();

        cfg.storage.mongodb_uri = std::env::var("MONGODB_URI").ok();
        cfg.storage.chroma_persist_path = std::env::var("CHROMA_PERSIST_PATH").ok();

        if let Ok(v) = std::env::var("CORS_ORIGINS") {
            cfg.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(v) = std::env::var("MIN_SIMILARITY") {
            if let Ok(parsed) = v.parse() {
                cfg.retrieval.min_similarity = parsed;
            }
        }
        if let Ok(v) = std::env::var("CHUNK_SIZE") {
            if let Ok(parsed) = v.parse() {
                cfg.ingestion.chunk_size = parsed;
            }
        }
        if let Ok(v) = std::env::var("CHUNK_OVERLAP") {
            if let Ok(parsed) = v.parse() {
                cfg.ingestion.chunk_overlap = parsed;
            }
        }
        if let Ok(v) = std::env::var("T_COOLDOWN_SEC") {
            if let Ok(parsed) = v.parse() {
                cfg.ingestion.cooldown_secs = parsed;
            }
        }
        if let Ok(v) = std::env::var("T_REQUEST_SEC") {
            if let Ok(parsed) = v.parse() {
                cfg.request_deadline.online_secs = parsed;
            }
        }

        cfg
    }

    /// Eager validation; a misconfigured process refuses to start rather
    /// than failing on first request.
    pub fn validate(&self) -> Result<(), String> {
        if self.ingestion.chunk_overlap >= self.ingestion.chunk_size {
            return Err("chunk overlap must be smaller than chunk size".to_string());
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err("min_similarity must be within [0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.retrieval.canon_similarity) {
            return Err("canon_similarity must be within [0,1]".to_string());
        }
        if self.retrieval.context_budget == 0 {
            return Err("context_budget must be greater than zero".to_string());
        }
        if self.embeddings.dimension == 0 {
            return Err("embedding dimension must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_ge_chunk_size() {
        let mut cfg = AppConfig::default();
        cfg.ingestion.chunk_overlap = cfg.ingestion.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let mut cfg = AppConfig::default();
        cfg.retrieval.min_similarity = 1.5;
        assert!(cfg.validate().is_err());
    }
}
