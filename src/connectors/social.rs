use async_trait::async_trait;
use chrono::Utc;

use crate::models::{RawItem, SourceKind};

use super::SourceConnector;

/// Deterministic stand-in for a low-trust social media firehose. Social
/// items are never treated as primary evidence (spec §4.3: excluded from
/// the canon lookup, admitted only as low-weight context in reasoned
/// verification).
pub struct FakeSocialConnector {
    source_name: String,
}

impl FakeSocialConnector {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

impl Default for FakeSocialConnector {
    fn default() -> Self {
        Self::new("anonymous_poster_492")
    }
}

#[async_trait]
impl SourceConnector for FakeSocialConnector {
    fn provider_tag(&self) -> &str {
        "fake-social"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<RawItem>> {
        Ok(vec![RawItem {
            provider_tag: self.provider_tag().to_string(),
            kind: SourceKind::Social,
            source_name: self.source_name.clone(),
            url: Some(format!(
                "https://example-social.test/posts/{}",
                uuid::Uuid::new_v4()
            )),
            title: None,
            body: "did you know the water treatment plant budget got APPROVED last night?? \
                   heard it's going to triple our bills smh"
                .to_string(),
            published_at: Some(Utc::now()),
            language: Some("en".to_string()),
            provider_meta: serde_json::json!({ "likes": 12, "shares": 3 }),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_valid_items() {
        let connector = FakeSocialConnector::default();
        let items = connector.fetch().await.unwrap();
        assert!(!items.is_empty());
        for item in &items {
            item.validate().unwrap();
            assert_eq!(item.kind, SourceKind::Social);
        }
    }
}
