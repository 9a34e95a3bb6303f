use async_trait::async_trait;
use chrono::Utc;

use crate::models::{RawItem, SourceKind};

use super::SourceConnector;

/// Deterministic stand-in for a tier-1 newswire feed.
pub struct FakeNewsConnector {
    source_name: String,
}

impl FakeNewsConnector {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

impl Default for FakeNewsConnector {
    fn default() -> Self {
        Self::new("Reuters")
    }
}

#[async_trait]
impl SourceConnector for FakeNewsConnector {
    fn provider_tag(&self) -> &str {
        "fake-news"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>> {
        Ok(vec![RawItem {
            provider_tag: self.provider_tag().to_string(),
            kind: SourceKind::News,
            source_name: self.source_name.clone(),
            url: Some(format!(
                "https://example-news.test/articles/{}",
                uuid::Uuid::new_v4()
            )),
            title: Some("Local council approves new water treatment budget".to_string()),
            body: "The city council voted 6-1 Tuesday to approve a budget increase for the \
                   municipal water treatment plant, citing aging infrastructure. The increase \
                   takes effect next fiscal year."
                .to_string(),
            published_at: Some(Utc::now()),
            language: Some("en".to_string()),
            provider_meta: serde_json::json!({ "section": "local" }),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_valid_items() {
        let connector = FakeNewsConnector::default();
        let items = connector.fetch().await.unwrap();
        assert!(!items.is_empty());
        for item in &items {
            item.validate().unwrap();
            assert_eq!(item.kind, SourceKind::News);
        }
    }
}
