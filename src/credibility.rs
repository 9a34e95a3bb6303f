//! Pure credibility classification (spec §3): `(source_name, kind)` →
//! `{credibility_level, credibility_score, is_verified_source}`. Kept as a
//! pure function over a static rule table rather than a database lookup —
//! the teacher's `research` crate does the same for its source-trust scoring
//! in `vector_search.rs`, treating trust weight as static configuration
//! rather than a stateful service.

use crate::models::{CredibilityLevel, KBMetadata, SourceKind};

const GOV_MULTILATERAL: &[&str] = &[
    "who",
    "cdc",
    "un",
    "united nations",
    "world health organization",
    "eu commission",
    "european commission",
    "nih",
    "fda",
    "ecdc",
];

const ESTABLISHED_FACT_CHECKERS: &[&str] = &[
    "politifact",
    "snopes",
    "full fact",
    "factcheck.org",
    "afp fact check",
    "reuters fact check",
];

const TIER1_NEWS: &[&str] = &[
    "reuters",
    "associated press",
    "ap",
    "bbc",
    "bbc news",
    "the guardian",
    "the new york times",
    "the washington post",
    "npr",
    "al jazeera",
];

/// `is_verified_source` threshold (spec §3: "credibility_score ≥ 0.85").
const VERIFIED_THRESHOLD: f32 = 0.85;

fn normalize(source_name: &str) -> String {
    source_name.trim().to_lowercase()
}

fn matches_any(name: &str, table: &[&str]) -> bool {
    table.iter().any(|candidate| *candidate == name)
}

/// Classify a source by name and kind into a credibility level and score.
///
/// The `kind` parameter breaks ties when a source name is ambiguous in
/// isolation (e.g. a government press office vs. a newswire of the same
/// name) and provides the default bucket for sources absent from the static
/// tables.
pub fn classify(source_name: &str, kind: SourceKind) -> (CredibilityLevel, f32) {
    let normalized = normalize(source_name);

    if matches_any(&normalized, GOV_MULTILATERAL) || kind == SourceKind::Gov {
        return (CredibilityLevel::High, 0.95);
    }
    if matches_any(&normalized, ESTABLISHED_FACT_CHECKERS) || kind == SourceKind::Factcheck {
        return (CredibilityLevel::High, 0.90);
    }
    if matches_any(&normalized, TIER1_NEWS) {
        return (CredibilityLevel::MediumHigh, 0.80);
    }
    if kind == SourceKind::News {
        return (CredibilityLevel::Medium, 0.60);
    }
    (CredibilityLevel::Low, 0.35)
}

/// `true` once a source's credibility score clears [`VERIFIED_THRESHOLD`].
pub fn is_verified_source(credibility_score: f32) -> bool {
    credibility_score >= VERIFIED_THRESHOLD
}

/// Build the credibility fields of a [`KBMetadata`] for a source.
pub fn classify_metadata(source_name: &str, kind: SourceKind) -> (CredibilityLevel, f32, bool) {
    let (level, score) = classify(source_name, kind);
    (level, score, is_verified_source(score))
}

/// Convenience used by ingestion when assembling a full [`KBMetadata`] from a
/// raw item's source fields, keeping the three derived fields consistent.
pub fn annotate(metadata: &mut KBMetadata) {
    let (level, score, verified) = classify_metadata(&metadata.source_name, metadata.kind);
    metadata.credibility_level = level;
    metadata.credibility_score = score;
    metadata.is_verified_source = verified;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gov_source_is_high_credibility() {
        let (level, score) = classify("WHO", SourceKind::Gov);
        assert_eq!(level, CredibilityLevel::High);
        assert!((score - 0.95).abs() < f32::EPSILON);
        assert!(is_verified_source(score));
    }

    #[test]
    fn established_fact_checker_is_high() {
        let (level, score) = classify("PolitiFact", SourceKind::Factcheck);
        assert_eq!(level, CredibilityLevel::High);
        assert!((score - 0.90).abs() < f32::EPSILON);
    }

    #[test]
    fn tier1_news_is_medium_high() {
        let (level, score) = classify("Reuters", SourceKind::News);
        assert_eq!(level, CredibilityLevel::MediumHigh);
        assert!((score - 0.80).abs() < f32::EPSILON);
        assert!(!is_verified_source(score));
    }

    #[test]
    fn unknown_news_source_is_medium() {
        let (level, score) = classify("Random Local Gazette", SourceKind::News);
        assert_eq!(level, CredibilityLevel::Medium);
        assert!((score - 0.60).abs() < f32::EPSILON);
    }

    #[test]
    fn social_source_is_low() {
        let (level, score) = classify("some_rando_account", SourceKind::Social);
        assert_eq!(level, CredibilityLevel::Low);
        assert!((score - 0.35).abs() < f32::EPSILON);
        assert!(!is_verified_source(score));
    }

    #[test]
    fn classification_is_case_and_whitespace_insensitive() {
        let (a, _) = classify("  Reuters  ", SourceKind::News);
        let (b, _) = classify("reuters", SourceKind::News);
        assert_eq!(a, b);
    }
}
