//! Public API surface (C9). Built with `axum`, grounded in
//! `orchestration::api`'s handler conventions: a typed `ApiError` that
//! implements `IntoResponse`, shared state injected via `Extension`, and
//! `tower-http` middleware layered onto the router rather than hand-rolled
//! in each handler.

pub mod admin;

use std::sync::Arc;

use axum::extract::{Extension, Json};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::EngineError;
use crate::models::Feedback;
use crate::resilience::HealthStatus;
use crate::verify::{SourceUsed, VerifyEngine, VerifyRequest};

pub struct AppState {
    pub verify_engine: Arc<VerifyEngine>,
    pub ingest_orchestrator: Arc<crate::ingest::IngestOrchestrator>,
    pub document_store: Arc<dyn crate::document_store::DocumentStore>,
    pub model_gateway: Arc<crate::gateway::ModelGateway>,
    pub admin_token: Option<String>,
}

/// Uniform API error shape; every handler's fallible path funnels through
/// `EngineError`'s status-code mapping (spec §7).
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        ApiError(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub(crate) fn require_admin(headers: &HeaderMap, expected: &Option<String>) -> Result<(), ApiError> {
    let Some(expected_token) = expected else {
        return Ok(());
    };
    let provided = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != expected_token {
        return Err(ApiError(EngineError::Unauthorized));
    }
    Ok(())
}

pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/verify", post(verify_handler))
        .route("/feedback", post(feedback_handler))
        .route("/health", get(health_handler))
        .route("/admin/ingest", post(admin::ingest_handler))
        .route("/admin/logs", get(admin::logs_handler))
        .route("/user/history", get(admin::history_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequestBody {
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub category: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Serialize)]
pub struct SourceUsedBody {
    pub url: Option<String>,
    pub source_name: String,
    pub kind: String,
    pub credibility_score: f32,
}

impl From<SourceUsed> for SourceUsedBody {
    fn from(value: SourceUsed) -> Self {
        SourceUsedBody {
            url: value.url,
            source_name: value.source_name,
            kind: value.kind.as_str().to_string(),
            credibility_score: value.credibility_score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyResponseBody {
    pub mode: String,
    pub verdict: String,
    pub confidence: f32,
    pub contradiction_score: f32,
    pub explanation: String,
    pub sources_used: Vec<SourceUsedBody>,
    pub model_used: Option<String>,
    pub raw_answer: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

async fn verify_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyRequestBody>,
) -> Result<Json<VerifyResponseBody>, ApiError> {
    let fingerprint = headers
        .get("x-client-fingerprint")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let request = VerifyRequest {
        claim_text: body.text,
        language: body.language,
        category: body.category,
        client_fingerprint: fingerprint,
    };

    let response = state.verify_engine.verify(request).await?;

    Ok(Json(VerifyResponseBody {
        mode: format!("{:?}", response.mode),
        verdict: response.verdict.as_str().to_string(),
        confidence: response.confidence,
        contradiction_score: response.contradiction_score,
        explanation: response.explanation,
        sources_used: response.sources_used.into_iter().map(SourceUsedBody::from).collect(),
        model_used: response.model_used,
        raw_answer: response.raw_answer,
        timestamp: response.timestamp,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequestBody {
    pub claim_text: String,
    pub verdict_returned: String,
    pub comment: String,
    pub screenshot_url: Option<String>,
}

async fn feedback_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<FeedbackRequestBody>,
) -> Result<StatusCode, ApiError> {
    let feedback = Feedback {
        feedback_id: uuid::Uuid::new_v4().to_string(),
        received_at: chrono::Utc::now(),
        claim_text: body.claim_text,
        verdict_returned: crate::models::Verdict::parse_coerce(&body.verdict_returned),
        comment: body.comment,
        screenshot_url: body.screenshot_url,
    };
    state
        .document_store
        .append_feedback(feedback)
        .await
        .map_err(ApiError::from)?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Serialize)]
pub struct HealthResponseBody {
    pub status: String,
    pub backends: std::collections::HashMap<String, HealthStatus>,
    pub document_store_ok: bool,
}

async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponseBody> {
    let backends = state.model_gateway.health_snapshot();
    let document_store_ok = state.document_store.health_check().await;

    let overall = if !document_store_ok {
        HealthStatus::Unhealthy
    } else if backends.values().any(|s| *s != HealthStatus::Healthy) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponseBody {
        status: format!("{overall:?}").to_lowercase(),
        backends,
        document_store_ok,
    })
}

pub(crate) use require_admin as require_admin_token;
