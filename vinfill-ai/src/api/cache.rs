//! Cache maintenance endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::CacheStats;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    /// Entries stored longer ago than this are removed; defaults to the configured age
    pub max_age_hours: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub removed: u64,
    pub max_age_hours: u64,
}

/// POST /cache/prune?max_age_hours=N
pub async fn prune_cache(
    State(state): State<AppState>,
    Query(query): Query<PruneQuery>,
) -> ApiResult<Json<PruneResponse>> {
    let max_age_hours = query.max_age_hours.unwrap_or(state.prune_max_age_hours);
    let secs = max_age_hours
        .checked_mul(3600)
        .ok_or_else(|| ApiError::BadRequest(format!("max_age_hours out of range: {}", max_age_hours)))?;

    let removed = state.cache.prune(Duration::from_secs(secs)).await;
    Ok(Json(PruneResponse {
        removed,
        max_age_hours,
    }))
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/prune", post(prune_cache))
        .route("/cache/stats", get(cache_stats))
}
