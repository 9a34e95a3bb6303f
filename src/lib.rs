//! Verity Engine: a RAG-based claim verification service. Given a claim, it
//! either returns a previously adjudicated verdict (canon lookup) or
//! reasons over retrieved evidence from a continuously refreshed corpus of
//! news, government, and fact-check sources (grounded reasoning).

pub mod api;
pub mod chunker;
pub mod config;
pub mod connectors;
pub mod credibility;
pub mod dedupe;
pub mod document_store;
pub mod embeddings;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod models;
pub mod resilience;
pub mod vector_index;
pub mod verify;

pub use error::EngineError;
