//! Work item endpoints
//!
//! POST /items, GET /items/:id, POST /items/retry-failed

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ItemDescriptor, StateTransition, WorkItem};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    #[serde(flatten)]
    pub item: WorkItem,
    pub transitions: Vec<StateTransition>,
}

#[derive(Debug, Serialize)]
pub struct RetryFailedResponse {
    pub requeued: u64,
}

/// POST /items
///
/// Returns 201 Created with the new item ID.
pub async fn enqueue_item(
    State(state): State<AppState>,
    Json(descriptor): Json<ItemDescriptor>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let id = state.repo.enqueue(&descriptor).await?;
    info!(item_id = %id, "Enqueued {}", descriptor.label());
    Ok((StatusCode::CREATED, Json(EnqueueResponse { id })))
}

/// GET /items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ItemResponse>> {
    let item = state
        .repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Work item {}", id)))?;
    let transitions = state.repo.transitions(id).await?;
    Ok(Json(ItemResponse { item, transitions }))
}

/// POST /items/retry-failed
///
/// Moves every failed item back to pending with a fresh attempt budget.
pub async fn retry_failed(State(state): State<AppState>) -> ApiResult<Json<RetryFailedResponse>> {
    match state.repo.reset_failed().await {
        Ok(requeued) => {
            info!("Requeued {} failed items", requeued);
            Ok(Json(RetryFailedResponse { requeued }))
        }
        Err(e) => {
            state.record_error(format!("retry-failed: {}", e)).await;
            Err(e.into())
        }
    }
}

pub fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/items", post(enqueue_item))
        .route("/items/retry-failed", post(retry_failed))
        .route("/items/:id", get(get_item))
}
