use async_trait::async_trait;
use chrono::Utc;

use crate::models::{RawItem, SourceKind};

use super::SourceConnector;

/// Deterministic stand-in for a Google Fact Check Tools-style feed. The
/// provider-specific rating string lives in `provider_meta.rating` and is
/// normalized into a [`crate::models::CanonVerdict`] during ingestion
/// (spec §4.6's verdict normalization table).
pub struct FakeFactCheckConnector {
    source_name: String,
}

impl FakeFactCheckConnector {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

impl Default for FakeFactCheckConnector {
    fn default() -> Self {
        Self::new("PolitiFact")
    }
}

#[async_trait]
impl SourceConnector for FakeFactCheckConnector {
    fn provider_tag(&self) -> &str {
        "fake-factcheck"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>> {
        Ok(vec![RawItem {
            provider_tag: self.provider_tag().to_string(),
            kind: SourceKind::Factcheck,
            source_name: self.source_name.clone(),
            url: Some(format!(
                "https://example-factcheck.test/claims/{}",
                uuid::Uuid::new_v4()
            )),
            title: Some("Claim: drinking bleach cures common cold".to_string()),
            body: "A viral social post claims that drinking diluted bleach cures the common \
                   cold within 24 hours. Medical experts confirm there is no evidence for this \
                   claim and that ingesting bleach is dangerous."
                .to_string(),
            published_at: Some(Utc::now()),
            language: Some("en".to_string()),
            provider_meta: serde_json::json!({ "rating": "False" }),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_valid_items_with_rating_metadata() {
        let connector = FakeFactCheckConnector::default();
        let items = connector.fetch().await.unwrap();
        assert!(!items.is_empty());
        for item in &items {
            item.validate().unwrap();
            assert_eq!(item.kind, SourceKind::Factcheck);
            assert!(item.provider_meta.get("rating").is_some());
        }
    }
}
