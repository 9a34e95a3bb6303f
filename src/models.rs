//! Data model (spec §3). All identifiers are opaque strings unless stated;
//! timestamps are UTC instants, ISO 8601 at the wire boundary via `chrono`'s
//! serde support — the same convention as `database::models`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of upstream source a `RawItem` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    News,
    Gov,
    Factcheck,
    Social,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::News => "news",
            SourceKind::Gov => "gov",
            SourceKind::Factcheck => "factcheck",
            SourceKind::Social => "social",
        }
    }
}

/// Normalized ingestion input common to all source connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub provider_tag: String,
    pub kind: SourceKind,
    pub source_name: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub provider_meta: serde_json::Value,
}

impl RawItem {
    /// Invariant: `body` non-empty after trim; `url` absent or a valid
    /// absolute URL.
    pub fn validate(&self) -> Result<(), String> {
        if self.body.trim().is_empty() {
            return Err("raw item body must be non-empty after trim".to_string());
        }
        if let Some(url) = &self.url {
            url::Url::parse(url).map_err(|_| "raw item url is not a valid absolute URL".to_string())?;
        }
        Ok(())
    }
}

/// A character span, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

/// One sliding-window slice of a `RawItem`'s body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub parent_raw_id: String,
    pub ordinal: usize,
    pub text: String,
    pub char_span: CharSpan,
}

/// One row in a vector collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KBRecord {
    pub record_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: KBMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KBMetadata {
    pub kind: SourceKind,
    pub source_name: String,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub credibility_score: f32,
    pub credibility_level: CredibilityLevel,
    pub is_verified_source: bool,
    /// Set only on records in the `verified_claims` collection: the
    /// adjudicated verdict this canon record carries. `None` for every
    /// other evidence collection.
    pub canon_verdict: Option<CanonVerdict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredibilityLevel {
    High,
    MediumHigh,
    Medium,
    Low,
}

impl CredibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredibilityLevel::High => "high",
            CredibilityLevel::MediumHigh => "medium-high",
            CredibilityLevel::Medium => "medium",
            CredibilityLevel::Low => "low",
        }
    }
}

/// The verdict taxonomy used across canon lookups and reasoned verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    True,
    False,
    Misleading,
    Unverified,
}

impl Verdict {
    /// Case-insensitive parse with coercion to `Unverified` for anything
    /// unrecognized (spec §4.7-6).
    pub fn parse_coerce(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "true" => Verdict::True,
            "false" => Verdict::False,
            "misleading" => Verdict::Misleading,
            _ => Verdict::Unverified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::True => "true",
            Verdict::False => "false",
            Verdict::Misleading => "misleading",
            Verdict::Unverified => "unverified",
        }
    }
}

/// Canon verdict taxonomy for `VerifiedClaim`, a strict subset of `Verdict`
/// (no `Unverified` — an unadjudicated claim simply has no canon row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CanonVerdict {
    True,
    False,
    Misleading,
}

impl CanonVerdict {
    pub fn as_verdict(&self) -> Verdict {
        match self {
            CanonVerdict::True => Verdict::True,
            CanonVerdict::False => Verdict::False,
            CanonVerdict::Misleading => Verdict::Misleading,
        }
    }
}

/// A previously adjudicated claim used as cache and prior truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedClaim {
    pub claim_id: String,
    pub claim_text: String,
    pub normalized_claim_text: String,
    pub verdict: CanonVerdict,
    pub explanation: String,
    pub source_url: String,
    pub publisher: String,
    pub language: String,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub provider_tag: String,
}

/// Which branch of the verification algorithm produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    ExistingFactCheck,
    Reasoned,
    Refused,
}

/// Append-only audit row for one `/verify` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimLog {
    pub log_id: String,
    pub received_at: DateTime<Utc>,
    pub client_fingerprint: String,
    pub claim_text: String,
    pub language: String,
    pub category: Option<String>,
    pub mode: VerifyMode,
    pub verdict: Verdict,
    pub confidence: f32,
    pub contradiction_score: f32,
    pub sources_used: Vec<String>,
    pub model_used: Option<String>,
    pub latency_ms: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestStatus {
    Running,
    Ok,
    Partial,
    Failed,
}

/// Counts of raw items ingested per source kind in one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestCounts {
    pub news: u64,
    pub gov: u64,
    pub factcheck: u64,
    pub social: u64,
}

/// Record of one ingestion orchestrator execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub triggered_by: String,
    pub forced: bool,
    pub status: IngestStatus,
    pub counts: IngestCounts,
    pub errors: Vec<ConnectorError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorError {
    pub connector: String,
    pub message: String,
}

/// User-submitted feedback on a returned verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback_id: String,
    pub received_at: DateTime<Utc>,
    pub claim_text: String,
    pub verdict_returned: Verdict,
    pub comment: String,
    pub screenshot_url: Option<String>,
}

/// One retrieved evidence item with its similarity and credibility metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub record_id: String,
    pub similarity: f32,
    pub metadata: KBMetadata,
    pub text: String,
}

/// Credibility bucket configuration row, kept as data rather than a literal
/// match arm so deployments can retune it (spec §9: "the credibility table
/// is illustrative; treat it as configuration").
#[derive(Debug, Clone)]
pub struct CredibilityRule {
    pub source_names: Vec<&'static str>,
    pub level: CredibilityLevel,
    pub score: f32,
}

pub type ProviderMetadata = HashMap<String, String>;
