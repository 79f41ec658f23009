//! vinfill-ai library interface
//!
//! Exposes the enrichment engine and HTTP surface for the binary and for
//! integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod models;
pub mod services;
pub mod utils;
pub mod validators;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::cache::CacheTier;
use crate::config::DaemonSettings;
use crate::db::ItemRepository;
use crate::generation::GenerationService;
use crate::services::{ConfidenceGate, EnrichmentDaemon, FallbackGenerator, ItemProcessor};
use crate::utils::Clock;
use crate::workflow::EnrichmentPipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn ItemRepository>,
    pub cache: Arc<CacheTier>,
    pub daemon: EnrichmentDaemon,
    /// Default age for `POST /cache/prune` without a query parameter
    pub prune_max_age_hours: u64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn ItemRepository>,
        cache: Arc<CacheTier>,
        daemon: EnrichmentDaemon,
        prune_max_age_hours: u64,
    ) -> Self {
        Self {
            repo,
            cache,
            daemon,
            prune_max_age_hours,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Wire gate, pipeline, fallback and processor into a daemon
pub fn build_daemon(
    repo: Arc<dyn ItemRepository>,
    generation: Arc<GenerationService>,
    clock: Arc<dyn Clock>,
    settings: &DaemonSettings,
) -> EnrichmentDaemon {
    let processor = ItemProcessor::new(
        repo.clone(),
        ConfidenceGate::new(generation.clone()),
        EnrichmentPipeline::new(generation.clone()),
        FallbackGenerator::new(generation, clock.clone()),
        clock,
        settings.max_attempts,
    );
    EnrichmentDaemon::new(repo, Arc::new(processor), settings.daemon_config())
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::daemon_routes())
        .merge(api::cache_routes())
        .merge(api::item_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
