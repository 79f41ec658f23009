//! HTTP control surface tests via `tower::ServiceExt::oneshot`

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::{descriptor, full_script, harness, high_confidence, Harness};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use vinfill_ai::generation::ScriptedGenerationClient;
use vinfill_ai::models::ItemStatus;

fn app(h: &Harness) -> axum::Router {
    let state = vinfill_ai::AppState::new(
        h.repo.clone(),
        h.cache.clone(),
        h.daemon.clone(),
        h.settings.cache_prune_max_age_hours,
    );
    vinfill_ai::build_router(state)
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_reports_module_and_daemon_state() {
    let h = harness(ScriptedGenerationClient::new()).await;

    let (status, body) = send(app(&h), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["module"], "vinfill-ai");
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["daemon_running"], false);
    assert!(body["uptime_seconds"].is_u64());
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_daemon_start_stop_round() {
    let h = harness(ScriptedGenerationClient::new()).await;

    let (status, body) = send(app(&h), "POST", "/daemon/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["status"]["is_running"], true);

    let (_, body) = send(app(&h), "POST", "/daemon/start", None).await;
    assert_eq!(body["changed"], false);

    let (_, body) = send(app(&h), "GET", "/daemon/status", None).await;
    assert_eq!(body["is_running"], true);
    assert_eq!(body["max_concurrent"], 3);
    assert_eq!(body["processing_count"], 0);

    let (_, body) = send(app(&h), "POST", "/daemon/stop", None).await;
    assert_eq!(body["changed"], true);
    assert_eq!(body["status"]["is_running"], false);

    let (_, body) = send(app(&h), "POST", "/daemon/stop", None).await;
    assert_eq!(body["changed"], false);
}

#[tokio::test]
async fn test_enqueue_and_fetch_item() {
    let h = harness(full_script(high_confidence())).await;

    let (status, body) = send(
        app(&h),
        "POST",
        "/items",
        Some(json!({"name": "Barolo Cannubi", "category": "red", "producer": "Brezza", "vintage": 2016})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();

    h.daemon.run_cycle().await.unwrap();
    h.daemon.drain().await;

    let (status, body) = send(app(&h), "GET", &format!("/items/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed_verified");
    assert_eq!(body["transitions"].as_array().unwrap().len(), 2);
    assert_eq!(body["enrichment"]["provenance"], "verified");

    let (_, stats) = send(app(&h), "GET", "/daemon/stats", None).await;
    assert_eq!(stats["processed"], 1);
    assert_eq!(stats["succeeded"], 1);
}

#[tokio::test]
async fn test_enqueue_blank_name_is_bad_request() {
    let h = harness(ScriptedGenerationClient::new()).await;
    let (status, body) = send(app(&h), "POST", "/items", Some(json!({"name": " ", "category": "white"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let h = harness(ScriptedGenerationClient::new()).await;
    let (status, body) = send(app(&h), "GET", &format!("/items/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_retry_failed_requeues_items() {
    let h = harness(ScriptedGenerationClient::new()).await;
    let id = h.repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();
    h.repo.claim(id).await.unwrap();
    h.repo.release_for_retry(id, "gave up", 1).await.unwrap();

    let (status, body) = send(app(&h), "POST", "/items/retry-failed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requeued"], 1);
    assert_eq!(h.repo.get(id).await.unwrap().unwrap().status, ItemStatus::Pending);
}

#[tokio::test]
async fn test_cache_prune_removes_old_entries() {
    let h = harness(ScriptedGenerationClient::new()).await;
    h.cache.set("gate", "old", "{}".to_string(), None).await;
    h.clock.advance(chrono::Duration::hours(3));
    h.cache.set("gate", "new", "{}".to_string(), None).await;

    let (status, body) = send(app(&h), "POST", "/cache/prune?max_age_hours=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert_eq!(body["max_age_hours"], 2);

    let (_, body) = send(app(&h), "POST", "/cache/prune", None).await;
    assert_eq!(body["removed"], 0);
    assert_eq!(body["max_age_hours"], 168);
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let h = harness(ScriptedGenerationClient::new()).await;
    h.cache.set("gate", "input", "{}".to_string(), None).await;
    assert!(h.cache.get("gate", "input").await.is_some());

    let (status, body) = send(app(&h), "GET", "/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);
    assert_eq!(body["hits"], 1);
}
