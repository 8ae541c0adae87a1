use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState, SERVICE_NAME};
use crate::service::{
    HistoryQuery, ServiceError, StatusReport, SubmissionReceipt, SubmitRequest,
};
use crate::store::{ReviewDetails, ReviewSummary};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Meta
// ============================================================================

pub fn meta_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "AliBot code review backend",
        "version": VERSION,
        "endpoints": {
            "health": "/health",
            "analyze": "/api/analyze",
            "status": "/api/analyze/status/{review_id}",
            "review": "/dashboard/review/{review_id}",
            "history": "/dashboard/history",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": VERSION,
    }))
}

// ============================================================================
// Analysis
// ============================================================================

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze", post(submit))
        .route("/api/analyze/status/:id", get(status))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: String,
}

async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::unprocessable(e.body_text()))?;

    let service = state.service.clone();
    let (receipt, job) = tokio::task::spawn_blocking(move || service.submit(request))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to submit code: {}", e)))?
        .map_err(|e| match e {
            ServiceError::Invalid(msg) => ApiError::unprocessable(msg),
            other => {
                error!("Submission failed: {}", other);
                ApiError::internal(format!("Failed to submit code: {}", other))
            }
        })?;

    // Fire and forget; process() records its own outcome.
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || service.process(job));
    info!("Queued analysis for review {}", receipt.actual_review_id);

    Ok(Json(receipt))
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<StatusReport>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::unprocessable(e.body_text()))?;
    let service = state.service.clone();
    blocking(move || service.status(&id, &query.user_id)).await.map(Json)
}

// ============================================================================
// Dashboard
// ============================================================================

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/review/:id", get(review))
        .route("/dashboard/history", get(history))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    user_id: String,
    page: Option<u32>,
    limit: Option<u32>,
    language: Option<String>,
    status: Option<String>,
}

impl HistoryParams {
    fn into_parts(self) -> (String, HistoryQuery) {
        let defaults = HistoryQuery::default();
        let query = HistoryQuery {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
            language: self.language.filter(|l| !l.is_empty()),
            status: self.status.filter(|s| !s.is_empty()),
        };
        (self.user_id, query)
    }
}

async fn review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ReviewDetails>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::unprocessable(e.body_text()))?;
    let service = state.service.clone();
    blocking(move || service.review(&id, &query.user_id)).await.map(Json)
}

async fn history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<ReviewSummary>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::unprocessable(e.body_text()))?;
    let (user_id, query) = params.into_parts();
    let service = state.service.clone();
    blocking(move || service.history(&user_id, &query)).await.map(Json)
}

/// Run a store-backed service call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(ApiError::from)
}
