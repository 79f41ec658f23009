//! Daemon control endpoints
//!
//! GET /daemon/status, POST /daemon/start, POST /daemon/stop, GET /daemon/stats

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::services::{BatchStats, DaemonStatus};
use crate::AppState;

/// POST /daemon/start and /daemon/stop response
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// False when the daemon was already in the requested state
    pub changed: bool,
    pub status: DaemonStatus,
}

pub async fn get_status(State(state): State<AppState>) -> Json<DaemonStatus> {
    Json(state.daemon.status())
}

pub async fn start_daemon(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.daemon.start();
    if changed {
        info!("Daemon started via API");
    }
    Json(ControlResponse {
        changed,
        status: state.daemon.status(),
    })
}

/// Halts future claims; in-flight items run to completion
pub async fn stop_daemon(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.daemon.stop();
    if changed {
        info!("Daemon stopped via API");
    }
    Json(ControlResponse {
        changed,
        status: state.daemon.status(),
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<BatchStats> {
    Json(state.daemon.stats())
}

pub fn daemon_routes() -> Router<AppState> {
    Router::new()
        .route("/daemon/status", get(get_status))
        .route("/daemon/start", post(start_daemon))
        .route("/daemon/stop", post(stop_daemon))
        .route("/daemon/stats", get(get_stats))
}
