//! Source connectors (C1). Defines the `SourceConnector` trait the
//! ingestion orchestrator programs against, plus four deterministic fake
//! implementations used for tests and offline operation — the same posture
//! the teacher takes with `DummyEmbeddingProvider` standing in for a remote
//! dependency behind an identical trait.

pub mod factcheck;
pub mod gov;
pub mod news;
pub mod social;

use async_trait::async_trait;

use crate::models::RawItem;

#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Unique tag identifying this connector's provenance, stamped onto
    /// every `RawItem.provider_tag` it produces.
    fn provider_tag(&self) -> &str;

    /// Fetch the next batch of items since the connector's internal
    /// watermark. Implementations own their own pagination/cursor state.
    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>>;
}

pub use factcheck::FakeFactCheckConnector;
pub use gov::FakeGovConnector;
pub use news::FakeNewsConnector;
pub use social::FakeSocialConnector;
