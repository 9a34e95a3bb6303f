//! Deduplication (C5, spec §4.5): a raw item is a duplicate of something
//! already ingested if its normalized URL matches, or failing that, if its
//! content hash matches. Grounded in the teacher's `research` crate, which
//! keys its passage cache on a normalized-URL-or-content-hash pair rather
//! than raw URLs to avoid re-ingesting the same article behind tracking
//! query parameters.

use sha2::{Digest, Sha256};

use crate::models::RawItem;

/// Normalize a URL for dedup purposes: lowercase scheme/host, strip
/// fragment, drop common tracking query parameters, drop trailing slash.
pub fn url_key(raw_url: &str) -> Option<String> {
    let mut url = url::Url::parse(raw_url).ok()?;
    url.set_fragment(None);

    let filtered: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if filtered.is_empty() {
        url.set_query(None);
    } else {
        let query = filtered
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut key = format!(
        "{}://{}{}",
        url.scheme().to_lowercase(),
        url.host_str().unwrap_or("").to_lowercase(),
        url.path().trim_end_matches('/')
    );
    if let Some(q) = url.query() {
        key.push('?');
        key.push_str(q);
    }
    Some(key)
}

fn is_tracking_param(name: &str) -> bool {
    matches!(
        name,
        "utm_source"
            | "utm_medium"
            | "utm_campaign"
            | "utm_term"
            | "utm_content"
            | "fbclid"
            | "gclid"
            | "ref"
    )
}

/// SHA-256 hash of the normalized (whitespace-collapsed, lowercased) body
/// text, used as the dedup key when no URL is available.
pub fn content_key(body: &str) -> String {
    let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The dedup key for a raw item: its normalized URL if present, else its
/// content hash. Two items with the same key are considered duplicates.
pub fn dedup_key(item: &RawItem) -> String {
    item.url
        .as_deref()
        .and_then(url_key)
        .unwrap_or_else(|| content_key(&item.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_key_strips_tracking_params_and_fragment() {
        let a = url_key("https://Example.com/article/1?utm_source=twitter&id=9#section").unwrap();
        let b = url_key("https://example.com/article/1?id=9").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn url_key_strips_trailing_slash() {
        let a = url_key("https://example.com/path/").unwrap();
        let b = url_key("https://example.com/path").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_key_is_whitespace_and_case_insensitive() {
        let a = content_key("Hello   World");
        let b = content_key("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn dedup_key_prefers_url_over_content() {
        let item = RawItem {
            provider_tag: "t".into(),
            kind: crate::models::SourceKind::News,
            source_name: "s".into(),
            url: Some("https://example.com/a".into()),
            title: None,
            body: "some body text".into(),
            published_at: None,
            language: None,
            provider_meta: serde_json::Value::Null,
        };
        assert_eq!(dedup_key(&item), url_key("https://example.com/a").unwrap());
    }
}
