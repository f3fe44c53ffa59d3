//! HTTP surface: submit text, poll results, read the audit trail.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::audit::{AuditLog, AuditRecord, AuditSummary};
use crate::error::{AuditError, VeracityError};
use crate::service::{JobView, StatusService, SubmissionService};

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub submissions: SubmissionService,
    pub status: StatusService,
    pub audit: Arc<AuditLog>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/results/:job_id", get(results))
        .route("/audit", get(audit_recent))
        .route("/audit/summary", get(audit_summary))
        .route("/health", get(health))
        .layer(cors())
        .with_state(state)
}

/// Lets browser dashboards on any origin submit and poll.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), VeracityError> {
    let Json(body) = body?;
    let job_id = state.submissions.submit(&body.text).await?;
    Ok((StatusCode::ACCEPTED, Json(AnalyzeResponse { job_id })))
}

async fn results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, VeracityError> {
    state.status.status(&job_id).map(Json)
}

async fn audit_recent(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditRecord>>, VeracityError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    let audit = Arc::clone(&state.audit);
    let records = tokio::task::spawn_blocking(move || audit.recent(limit))
        .await
        .map_err(|e| AuditError::Join(e.to_string()))??;
    Ok(Json(records))
}

async fn audit_summary(State(state): State<AppState>) -> Result<Json<AuditSummary>, VeracityError> {
    let audit = Arc::clone(&state.audit);
    let summary = tokio::task::spawn_blocking(move || audit.summary())
        .await
        .map_err(|e| AuditError::Join(e.to_string()))??;
    Ok(Json(summary))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

impl From<JsonRejection> for VeracityError {
    fn from(rejection: JsonRejection) -> Self {
        VeracityError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for VeracityError {
    fn into_response(self) -> Response {
        let status = match &self {
            VeracityError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            VeracityError::NotFound(_) => StatusCode::NOT_FOUND,
            VeracityError::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        json_error(status, self.code(), self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
