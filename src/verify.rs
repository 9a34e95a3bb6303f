//! RAG Verification Engine (C8, spec §4.8). Two phases: a canon lookup
//! against previously adjudicated claims (Phase 1), falling through to
//! grounded multi-collection retrieval plus a model-gateway reasoning call
//! when no canon hit clears the similarity floor (Phase 2). Grounded in
//! `research::vector_search`'s retrieval-then-rank shape, adapted from
//! passage search over one collection to fan-out search across the
//! `verified_claims`, `news_items`, `gov_items`, and `social_items`
//! collections with a single ranking formula.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{RetrievalConfig, RequestDeadlineConfig};
use crate::connectors::SourceConnector;
use crate::document_store::DocumentStore;
use crate::embeddings::{EmbeddingGateway, ProviderIdentity};
use crate::error::EngineError;
use crate::gateway::{GenerateOptions, ModelGateway};
use crate::models::{ClaimLog, Hit, SourceKind, Verdict, VerifyMode};
use crate::vector_index::VectorIndex;

/// Minimum similarity for a canon hit to short-circuit to Phase 1 (spec
/// §4.3/§4.8): a canon record must be an almost-exact semantic match, not
/// merely topically related.
const CANON_MATCH_FLOOR_DEFAULT: f32 = 0.85;

/// Per-collection retrieval budget for Phase 2 fan-out (spec §4.3): news and
/// government evidence gets a wider net than social media, which is
/// included as low-weight context only, never as primary evidence.
const COLLECTION_BUDGETS: &[(&str, usize, f32)] = &[
    ("news_items", 50, 0.65),
    ("gov_items", 20, 0.65),
    ("social_items", 15, 0.65),
];

/// Result count requested from each live connector fetch performed inline
/// during Phase 2, supplementing the vector-index hits with anything
/// published since the last ingestion run (spec §4.3).
const LIVE_NEWS_LIMIT: usize = 10;
const LIVE_FACTCHECK_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub claim_text: String,
    pub language: String,
    pub category: Option<String>,
    pub client_fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct VerifyResponse {
    pub mode: VerifyMode,
    pub verdict: Verdict,
    pub confidence: f32,
    pub contradiction_score: f32,
    pub explanation: String,
    pub sources_used: Vec<SourceUsed>,
    pub model_used: Option<String>,
    /// The model gateway's unparsed reply, kept for caller-side debugging
    /// and audit (spec §4.8). `None` on the canon-lookup path, where there
    /// is no model call.
    pub raw_answer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One piece of evidence the returned verdict actually relied on, carrying
/// enough of its `KBMetadata` for a caller to judge it without a second
/// lookup.
#[derive(Debug, Clone)]
pub struct SourceUsed {
    pub url: Option<String>,
    pub source_name: String,
    pub kind: SourceKind,
    pub credibility_score: f32,
}

impl SourceUsed {
    fn from_hit(hit: &Hit) -> Self {
        SourceUsed {
            url: hit.metadata.url.clone(),
            source_name: hit.metadata.source_name.clone(),
            kind: hit.metadata.kind,
            credibility_score: hit.metadata.credibility_score,
        }
    }
}

/// One LLM-reasoning output, parsed from the gateway's raw text reply.
#[derive(Debug, Clone)]
struct ParsedVerdict {
    verdict: Verdict,
    confidence: f32,
    contradiction_score: f32,
    explanation: String,
    /// 1-based indices into the evidence list the model was shown, as it
    /// reported which snippets it actually relied on (spec §4.7 step 6).
    cited_evidence_indices: Vec<usize>,
}

/// Minimum claim length, in trimmed chars, accepted by `/verify` (spec
/// §4.1): shorter than this can't possibly encode a checkable claim.
const MIN_CLAIM_CHARS: usize = 10;

pub struct VerifyEngine {
    document_store: Arc<dyn DocumentStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedding_gateway: Arc<EmbeddingGateway>,
    model_gateway: Arc<ModelGateway>,
    live_news: Arc<dyn SourceConnector>,
    live_factcheck: Arc<dyn SourceConnector>,
    retrieval: RetrievalConfig,
    deadline: RequestDeadlineConfig,
}

impl VerifyEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document_store: Arc<dyn DocumentStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedding_gateway: Arc<EmbeddingGateway>,
        model_gateway: Arc<ModelGateway>,
        live_news: Arc<dyn SourceConnector>,
        live_factcheck: Arc<dyn SourceConnector>,
        retrieval: RetrievalConfig,
        deadline: RequestDeadlineConfig,
    ) -> Self {
        Self {
            document_store,
            vector_index,
            embedding_gateway,
            model_gateway,
            live_news,
            live_factcheck,
            retrieval,
            deadline,
        }
    }

    #[instrument(skip(self), fields(correlation_id = %Uuid::new_v4()))]
    pub async fn verify(&self, request: VerifyRequest) -> Result<VerifyResponse, EngineError> {
        let started = Instant::now();

        let trimmed = request.claim_text.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InputInvalid("claim_text must not be empty".to_string()));
        }
        if trimmed.chars().count() < MIN_CLAIM_CHARS {
            return Err(EngineError::InputInvalid(format!(
                "claim_text must be at least {MIN_CLAIM_CHARS} characters"
            )));
        }

        let (embedding, identity) = self
            .embedding_gateway
            .embed_batch(&[request.claim_text.clone()])
            .await?;
        let query_vector = embedding.into_iter().next().expect("batch of one returns one vector");

        let response = match self.phase1_canon_lookup(&query_vector).await? {
            Some(response) => response,
            None => {
                self.phase2_reasoned_verification(&request, &query_vector, &identity).await?
            }
        };

        self.log_request(&request, &response, started.elapsed().as_millis() as u64).await;
        Ok(response)
    }

    async fn phase1_canon_lookup(&self, query_vector: &[f32]) -> Result<Option<VerifyResponse>, EngineError> {
        let hits = self
            .vector_index
            .search("verified_claims", query_vector, 1, CANON_MATCH_FLOOR_DEFAULT)
            .await?;

        let Some(top) = hits.into_iter().next() else {
            return Ok(None);
        };

        info!(record_id = %top.record_id, similarity = top.similarity, "canon hit found");
        let source = SourceUsed::from_hit(&top);
        Ok(Some(VerifyResponse {
            mode: VerifyMode::ExistingFactCheck,
            verdict: canon_verdict_from_hit(&top),
            confidence: top.similarity,
            contradiction_score: 0.0,
            explanation: top.text,
            sources_used: vec![source],
            model_used: None,
            raw_answer: None,
            timestamp: Utc::now(),
        }))
    }

    async fn phase2_reasoned_verification(
        &self,
        request: &VerifyRequest,
        query_vector: &[f32],
        query_identity: &ProviderIdentity,
    ) -> Result<VerifyResponse, EngineError> {
        let mut hits = Vec::new();
        for (collection, k, min_similarity) in COLLECTION_BUDGETS {
            if let Some(existing) = self.vector_index.provider_identity(collection) {
                if existing != *query_identity {
                    warn!(
                        collection,
                        indexed_with = %existing.model_name,
                        queried_with = %query_identity.model_name,
                        "query embedding provider differs from the provider that indexed this collection"
                    );
                }
            }
            let collection_hits = self.vector_index.search(collection, query_vector, *k, *min_similarity).await?;
            hits.extend(collection_hits);
        }

        hits.extend(self.fetch_live_hits(&self.live_news, query_vector, LIVE_NEWS_LIMIT).await);
        hits.extend(self.fetch_live_hits(&self.live_factcheck, query_vector, LIVE_FACTCHECK_LIMIT).await);

        if hits.is_empty() {
            warn!("no evidence cleared similarity floor");
            return Ok(VerifyResponse {
                mode: VerifyMode::Reasoned,
                verdict: Verdict::Unverified,
                confidence: 0.0,
                contradiction_score: 0.0,
                explanation: "No sufficiently similar evidence was found in the knowledge base.".to_string(),
                sources_used: Vec::new(),
                model_used: None,
                raw_answer: None,
                timestamp: Utc::now(),
            });
        }

        rank_hits(&mut hits);
        hits.truncate(self.retrieval.context_budget);

        let prompt = build_prompt(&request.claim_text, &hits, self.retrieval.snippet_chars);
        let system = "You are a careful fact-checking assistant. Given a claim and numbered \
                      evidence snippets, respond with a verdict (true, false, or misleading), a \
                      confidence between 0 and 1, a contradiction_score between 0 and 1 \
                      measuring how much the evidence disagrees with itself, \
                      cited_evidence_indices listing the 1-based numbers of the snippets you \
                      actually relied on, and a short explanation. Respond as JSON only.";

        let options = GenerateOptions {
            deadline: self.deadline.duration(false),
            ..GenerateOptions::default()
        };

        let generation = self.model_gateway.generate(system, &prompt, &options).await;

        let (raw_text, model_used) = match generation {
            Ok((text, model)) => (text, Some(model)),
            Err(EngineError::AllBackendsDown) => return Err(EngineError::AllBackendsDown),
            Err(other) => return Err(other),
        };

        let parsed = match parse_model_reply(&raw_text) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("model reply failed to parse on first attempt, retrying once");
                let retry_prompt = format!(
                    "{prompt}\n\nYour previous reply could not be parsed as JSON. Reply with \
                     ONLY a JSON object matching {{\"verdict\":...,\"confidence\":...,\"contradiction_score\":...,\"cited_evidence_indices\":[...],\"explanation\":...}}."
                );
                match self.model_gateway.generate(system, &retry_prompt, &options).await {
                    Ok((retry_text, retry_model)) => match parse_model_reply(&retry_text) {
                        Ok(parsed) => parsed,
                        Err(parse_error) => {
                            warn!(%parse_error, "model reply failed to parse twice, refusing");
                            return Ok(VerifyResponse {
                                mode: VerifyMode::Refused,
                                verdict: Verdict::Unverified,
                                confidence: 0.0,
                                contradiction_score: 0.0,
                                explanation: "The model's reply could not be interpreted as a verdict.".to_string(),
                                sources_used: Vec::new(),
                                model_used: Some(retry_model),
                                raw_answer: Some(retry_text),
                                timestamp: Utc::now(),
                            });
                        }
                    },
                    Err(EngineError::AllBackendsDown) => return Err(EngineError::AllBackendsDown),
                    Err(other) => return Err(other),
                }
            }
        };

        let cited_evidence_indices = parsed.cited_evidence_indices.clone();
        let cited_hits: Vec<Hit> = hits
            .iter()
            .enumerate()
            .filter(|(i, h)| cited_evidence_indices.contains(&(i + 1)) && !h.text.trim().is_empty())
            .map(|(_, h)| h.clone())
            .collect();

        let sources_used: Vec<SourceUsed> = cited_hits.iter().map(SourceUsed::from_hit).collect();
        let verdict = postprocess_verdict(parsed, &cited_hits);

        Ok(VerifyResponse {
            mode: VerifyMode::Reasoned,
            verdict: verdict.verdict,
            confidence: verdict.confidence,
            contradiction_score: verdict.contradiction_score,
            explanation: verdict.explanation,
            sources_used,
            model_used,
            raw_answer: Some(raw_text),
            timestamp: Utc::now(),
        })
    }

    /// Fetch fresh items straight from a live connector and score them
    /// against `query_vector`, supplementing the vector-index hits with
    /// anything published since the last ingestion run (spec §4.3). Errors
    /// are logged and treated as zero hits rather than failing the request:
    /// a live connector is an enhancement, not a dependency Phase 2 needs to
    /// function.
    async fn fetch_live_hits(&self, connector: &Arc<dyn SourceConnector>, query_vector: &[f32], limit: usize) -> Vec<Hit> {
        let items = match connector.fetch().await {
            Ok(items) => items,
            Err(error) => {
                warn!(connector = connector.provider_tag(), %error, "live connector fetch failed during verification");
                return Vec::new();
            }
        };
        if items.is_empty() {
            return Vec::new();
        }

        let bodies: Vec<String> = items.iter().map(|item| item.body.clone()).collect();
        let vectors = match self.embedding_gateway.embed_batch(&bodies).await {
            Ok((vectors, _identity)) => vectors,
            Err(error) => {
                warn!(%error, "failed to embed live connector items during verification");
                return Vec::new();
            }
        };

        let mut hits: Vec<Hit> = items
            .iter()
            .zip(vectors)
            .map(|(item, vector)| {
                let (level, score, verified) = crate::credibility::classify_metadata(&item.source_name, item.kind);
                Hit {
                    record_id: format!("live:{}:{}", item.provider_tag, crate::dedupe::content_key(&item.body)),
                    similarity: crate::vector_index::cosine_similarity(query_vector, &vector),
                    metadata: crate::models::KBMetadata {
                        kind: item.kind,
                        source_name: item.source_name.clone(),
                        url: item.url.clone(),
                        published_at: item.published_at,
                        title: item.title.clone(),
                        credibility_score: score,
                        credibility_level: level,
                        is_verified_source: verified,
                        canon_verdict: None,
                    },
                    text: item.body.clone(),
                }
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    async fn log_request(&self, request: &VerifyRequest, response: &VerifyResponse, latency_ms: u64) {
        let log = ClaimLog {
            log_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
            client_fingerprint: request.client_fingerprint.clone(),
            claim_text: request.claim_text.clone(),
            language: request.language.clone(),
            category: request.category.clone(),
            mode: response.mode,
            verdict: response.verdict,
            confidence: response.confidence,
            contradiction_score: response.contradiction_score,
            sources_used: response
                .sources_used
                .iter()
                .map(|s| s.url.clone().unwrap_or_else(|| s.source_name.clone()))
                .collect(),
            model_used: response.model_used.clone(),
            latency_ms,
            errors: Vec::new(),
        };
        if let Err(error) = self.document_store.append_claim_log(log).await {
            warn!(%error, "failed to persist claim log");
        }
    }
}

fn canon_verdict_from_hit(hit: &Hit) -> Verdict {
    hit.metadata
        .canon_verdict
        .map(|v| v.as_verdict())
        .unwrap_or(Verdict::Unverified)
}

/// Evidence ranking formula from spec §4.8: weighted blend of source
/// credibility and retrieval similarity, favouring trustworthy sources over
/// marginally closer but unreliable ones.
fn rank_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        let score_a = a.metadata.credibility_score * 0.6 + a.similarity * 0.4;
        let score_b = b.metadata.credibility_score * 0.6 + b.similarity * 0.4;
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn build_prompt(claim: &str, hits: &[Hit], snippet_chars: usize) -> String {
    let mut prompt = format!("Claim: \"{claim}\"\n\nEvidence:\n");
    for (i, hit) in hits.iter().enumerate() {
        let snippet: String = hit.text.chars().take(snippet_chars).collect();
        prompt.push_str(&format!(
            "[{}] source={} kind={} credibility={:.2}\n{}\n\n",
            i + 1,
            hit.metadata.source_name,
            hit.metadata.kind.as_str(),
            hit.metadata.credibility_score,
            snippet
        ));
    }
    prompt
}

fn parse_model_reply(text: &str) -> Result<ParsedVerdict, String> {
    let json_start = text.find('{').ok_or_else(|| "no JSON object found in reply".to_string())?;
    let json_end = text.rfind('}').ok_or_else(|| "no JSON object found in reply".to_string())?;
    let slice = &text[json_start..=json_end];
    let value: serde_json::Value = serde_json::from_str(slice).map_err(|e| e.to_string())?;

    let verdict = value
        .get("verdict")
        .and_then(|v| v.as_str())
        .map(Verdict::parse_coerce)
        .ok_or_else(|| "missing 'verdict' field".to_string())?;
    let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
    let contradiction_score = value.get("contradiction_score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
    let explanation = value
        .get("explanation")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let cited_evidence_indices = value
        .get("cited_evidence_indices")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_u64()).map(|n| n as usize).collect())
        .unwrap_or_default();

    Ok(ParsedVerdict {
        verdict,
        confidence: confidence.clamp(0.0, 1.0),
        contradiction_score: contradiction_score.clamp(0.0, 1.0),
        explanation,
        cited_evidence_indices,
    })
}

/// Clamps and downgrades a parsed verdict per spec §4.8: a reply whose
/// cited evidence is empty, entirely social-only, or carrying a high
/// contradiction score, is downgraded to `Unverified` rather than trusted
/// at face value. `cited_hits` is already filtered to the sources the model
/// actually relied on (spec §4.7 step 6).
fn postprocess_verdict(parsed: ParsedVerdict, cited_hits: &[Hit]) -> ParsedVerdict {
    let has_non_social_evidence = cited_hits.iter().any(|h| h.metadata.kind != SourceKind::Social);
    if cited_hits.is_empty() || !has_non_social_evidence || parsed.contradiction_score > 0.7 {
        return ParsedVerdict {
            verdict: Verdict::Unverified,
            ..parsed
        };
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredibilityLevel, KBMetadata};

    fn hit(source: &str, kind: SourceKind, credibility: f32, similarity: f32) -> Hit {
        Hit {
            record_id: format!("{source}-rec"),
            similarity,
            metadata: KBMetadata {
                kind,
                source_name: source.to_string(),
                url: Some(format!("https://example.com/{source}")),
                published_at: None,
                title: None,
                credibility_score: credibility,
                credibility_level: CredibilityLevel::Medium,
                is_verified_source: false,
                canon_verdict: None,
            },
            text: "evidence text".to_string(),
        }
    }

    #[test]
    fn rank_hits_favours_credibility_over_raw_similarity() {
        let mut hits = vec![
            hit("low-cred-high-sim", SourceKind::Social, 0.2, 0.95),
            hit("high-cred-lower-sim", SourceKind::Gov, 0.95, 0.70),
        ];
        rank_hits(&mut hits);
        assert_eq!(hits[0].record_id, "high-cred-lower-sim-rec");
    }

    #[test]
    fn parse_model_reply_extracts_embedded_json() {
        let text = "Sure, here is my answer:\n{\"verdict\":\"false\",\"confidence\":0.8,\"contradiction_score\":0.1,\"explanation\":\"no evidence\"}\nThanks!";
        let parsed = parse_model_reply(text).unwrap();
        assert!(matches!(parsed.verdict, Verdict::False));
        assert!((parsed.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_model_reply_rejects_missing_json() {
        assert!(parse_model_reply("no json here").is_err());
    }

    #[test]
    fn postprocess_downgrades_social_only_evidence() {
        let parsed = ParsedVerdict {
            verdict: Verdict::True,
            confidence: 0.9,
            contradiction_score: 0.1,
            explanation: "looks true".to_string(),
            cited_evidence_indices: vec![1],
        };
        let hits = vec![hit("rando", SourceKind::Social, 0.3, 0.9)];
        let result = postprocess_verdict(parsed, &hits);
        assert!(matches!(result.verdict, Verdict::Unverified));
    }

    #[test]
    fn postprocess_downgrades_high_contradiction() {
        let parsed = ParsedVerdict {
            verdict: Verdict::True,
            confidence: 0.9,
            contradiction_score: 0.9,
            explanation: "conflicting".to_string(),
            cited_evidence_indices: vec![1],
        };
        let hits = vec![hit("gov-source", SourceKind::Gov, 0.9, 0.9)];
        let result = postprocess_verdict(parsed, &hits);
        assert!(matches!(result.verdict, Verdict::Unverified));
    }

    #[test]
    fn postprocess_downgrades_when_no_cited_hits_survive_filtering() {
        let parsed = ParsedVerdict {
            verdict: Verdict::True,
            confidence: 0.9,
            contradiction_score: 0.1,
            explanation: "looks true".to_string(),
            cited_evidence_indices: vec![],
        };
        let result = postprocess_verdict(parsed, &[]);
        assert!(matches!(result.verdict, Verdict::Unverified));
    }

    #[test]
    fn parse_model_reply_extracts_cited_evidence_indices() {
        let text = "{\"verdict\":\"true\",\"confidence\":0.7,\"contradiction_score\":0.0,\"explanation\":\"cited\",\"cited_evidence_indices\":[1,3]}";
        let parsed = parse_model_reply(text).unwrap();
        assert_eq!(parsed.cited_evidence_indices, vec![1, 3]);
    }
}
