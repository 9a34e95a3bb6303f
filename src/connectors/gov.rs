use async_trait::async_trait;
use chrono::Utc;

use crate::models::{RawItem, SourceKind};

use super::SourceConnector;

/// Deterministic stand-in for a government/multilateral press-release feed.
pub struct FakeGovConnector {
    source_name: String,
}

impl FakeGovConnector {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

impl Default for FakeGovConnector {
    fn default() -> Self {
        Self::new("WHO")
    }
}

#[async_trait]
impl SourceConnector for FakeGovConnector {
    fn provider_tag(&self) -> &str {
        "fake-gov"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>> {
        Ok(vec![RawItem {
            provider_tag: self.provider_tag().to_string(),
            kind: SourceKind::Gov,
            source_name: self.source_name.clone(),
            url: Some(format!(
                "https://example-gov.test/releases/{}",
                uuid::Uuid::new_v4()
            )),
            title: Some("Updated guidance on seasonal respiratory illness prevention".to_string()),
            body: "The agency today published updated guidance recommending vaccination for \
                   high-risk groups ahead of the winter season, based on surveillance data \
                   collected over the preceding quarter."
                .to_string(),
            published_at: Some(Utc::now()),
            language: Some("en".to_string()),
            provider_meta: serde_json::json!({ "doc_type": "press_release" }),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_valid_items() {
        let connector = FakeGovConnector::default();
        let items = connector.fetch().await.unwrap();
        assert!(!items.is_empty());
        for item in &items {
            item.validate().unwrap();
            assert_eq!(item.kind, SourceKind::Gov);
        }
    }
}
