//! Admin-only endpoints: manual ingestion trigger, claim log inspection,
//! and per-user verification history. Gated by the `X-Admin-Token` header
//! when `admin_token` is configured (spec §6).

use std::sync::Arc;

use axum::extract::{Extension, Json, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::ingest::IngestRunError;

use super::{require_admin_token, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct IngestRequestBody {
    #[serde(default)]
    pub forced: bool,
}

#[derive(Debug, Serialize, Default)]
pub struct IngestedCounts {
    pub news: u64,
    pub gov: u64,
    pub factchecks: u64,
    pub social: u64,
}

#[derive(Debug, Serialize)]
pub struct IngestResponseBody {
    pub run_id: String,
    pub status: String,
    pub ingested: IngestedCounts,
    pub last_synced: Option<chrono::DateTime<chrono::Utc>>,
    pub errors: Vec<String>,
}

/// A rejected-before-starting response (spec §4.6): distinct from a
/// completed-with-errors run, and from the generic `ApiError` 409 shape, so
/// callers can tell a live run apart from a cooldown they should just wait
/// out.
pub struct IngestRejectedResponse {
    reason: &'static str,
}

impl IntoResponse for IngestRejectedResponse {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": "ingest run rejected",
            "reason": self.reason,
        }));
        (StatusCode::CONFLICT, body).into_response()
    }
}

pub enum IngestHandlerError {
    Rejected(IngestRejectedResponse),
    Api(ApiError),
}

impl From<IngestRunError> for IngestHandlerError {
    fn from(value: IngestRunError) -> Self {
        match value {
            IngestRunError::Rejected(reason) => {
                IngestHandlerError::Rejected(IngestRejectedResponse { reason: reason.as_str() })
            }
            IngestRunError::Engine(error) => IngestHandlerError::Api(ApiError::from(error)),
        }
    }
}

impl IntoResponse for IngestHandlerError {
    fn into_response(self) -> Response {
        match self {
            IngestHandlerError::Rejected(rejected) => rejected.into_response(),
            IngestHandlerError::Api(error) => error.into_response(),
        }
    }
}

pub async fn ingest_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<IngestRequestBody>,
) -> Result<Json<IngestResponseBody>, IngestHandlerError> {
    require_admin_token(&headers, &state.admin_token).map_err(IngestHandlerError::Api)?;

    let run = state.ingest_orchestrator.run("admin-api", body.forced).await?;

    Ok(Json(IngestResponseBody {
        run_id: run.run_id,
        status: format!("{:?}", run.status),
        ingested: IngestedCounts {
            news: run.counts.news,
            gov: run.counts.gov,
            factchecks: run.counts.factcheck,
            social: run.counts.social,
        },
        last_synced: run.finished_at,
        errors: run.errors.into_iter().map(|e| format!("{}: {}", e.connector, e.message)).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ClaimLogEntry {
    pub log_id: String,
    pub claim_text: String,
    pub mode: String,
    pub verdict: String,
    pub confidence: f32,
    pub latency_ms: u64,
}

pub async fn logs_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ClaimLogEntry>>, ApiError> {
    require_admin_token(&headers, &state.admin_token)?;

    let logs = state.document_store.list_claim_logs(query.limit).await?;

    Ok(Json(
        logs.into_iter()
            .map(|log| ClaimLogEntry {
                log_id: log.log_id,
                claim_text: log.claim_text,
                mode: format!("{:?}", log.mode),
                verdict: log.verdict.as_str().to_string(),
                confidence: log.confidence,
                latency_ms: log.latency_ms,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub fingerprint: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn history_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ClaimLogEntry>>, ApiError> {
    let logs = state.document_store.list_claim_logs(query.limit * 4).await?;

    Ok(Json(
        logs.into_iter()
            .filter(|log| log.client_fingerprint == query.fingerprint)
            .take(query.limit)
            .map(|log| ClaimLogEntry {
                log_id: log.log_id,
                claim_text: log.claim_text,
                mode: format!("{:?}", log.mode),
                verdict: log.verdict.as_str().to_string(),
                confidence: log.confidence,
                latency_ms: log.latency_ms,
            })
            .collect(),
    ))
}
