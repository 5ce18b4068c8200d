use crate::error::AppError;
use crate::tasks::process_call_webhook;
use crate::telephony_types::TelephonyWebhook;
use crate::types::{AppState, BatchRequest, SearchRequest, SearchResponse, StatusResponse};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, trace};
use uuid::Uuid;

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/search/continue", post(continue_search))
        .route("/status", post(status))
        .route("/status/:batch_id", get(status_by_path))
        .route("/webhooks/telephony", post(telephony_webhook))
        .route("/health", get(|| async { "ok" }))
        .with_state(app_state)
}

pub async fn search(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let response = app_state
        .coordinator
        .start_batch(request.query, request.max_calls)
        .await?;
    Ok(Json(response))
}

pub async fn continue_search(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let response = app_state
        .coordinator
        .continue_batch(request.batch_id)
        .await?;
    Ok(Json(response))
}

pub async fn status(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(
        app_state.coordinator.get_status(request.batch_id).await?,
    ))
}

pub async fn status_by_path(
    State(app_state): State<Arc<AppState>>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(app_state.coordinator.get_status(batch_id).await?))
}

/// Acknowledge right away; the provider does not wait for us to finish.
pub async fn telephony_webhook(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> StatusCode {
    trace!(body=%body, "telephony webhook body");
    match serde_json::from_str::<TelephonyWebhook>(&body) {
        Ok(webhook) => {
            tokio::spawn(process_call_webhook(app_state.driver.clone(), webhook));
        }
        Err(e) => {
            error!(error=%e, "failed to deserialize telephony webhook");
        }
    }
    StatusCode::OK
}
