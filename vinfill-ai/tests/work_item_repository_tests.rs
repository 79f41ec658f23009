//! Work item lifecycle against a real SQLite store

mod helpers;

use std::sync::Arc;

use helpers::{create_test_db, descriptor, fixed_clock, has_column, memory_pool};
use vinfill_ai::db::{ItemRepository, SqliteItemRepository, StatusUpdate};
use vinfill_ai::models::{EnrichedRecord, ItemDescriptor, ItemStatus, Provenance, WineCategory};
use vinfill_ai::workflow::integrate_fields;
use vinfill_common::Error;

async fn repository() -> SqliteItemRepository {
    SqliteItemRepository::new(memory_pool().await, fixed_clock())
}

fn record(provenance: Provenance) -> EnrichedRecord {
    let fields = helpers::scripts::fallback_reply();
    integrate_fields(fields.as_object().unwrap(), provenance, None, None)
}

fn assert_legal_history(transitions: &[vinfill_ai::models::StateTransition]) {
    for t in transitions {
        assert!(
            t.from.can_transition_to(t.to),
            "illegal transition recorded: {} -> {}",
            t.from,
            t.to
        );
    }
}

#[tokio::test]
async fn test_enqueue_then_claim_once() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();

    assert!(repo.claim(id).await.unwrap());
    assert!(!repo.claim(id).await.unwrap(), "second claim must lose");

    let item = repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Processing);
    assert_eq!(item.attempts, 1);
    assert!(item.started_at.is_some());
}

#[tokio::test]
async fn test_enqueue_rejects_blank_name() {
    let repo = repository().await;
    let result = repo.enqueue(&ItemDescriptor::new("   ", WineCategory::Red)).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_get_pending_respects_limit_and_status() {
    let repo = repository().await;
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(repo.enqueue(&descriptor(&format!("Wine {}", i))).await.unwrap());
    }
    repo.claim(ids[0]).await.unwrap();

    let pending = repo.get_pending(10).await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|item| item.status == ItemStatus::Pending));

    assert_eq!(repo.get_pending(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_commit_writes_enrichment_and_completes() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();
    repo.claim(id).await.unwrap();

    repo.commit_result(id, &record(Provenance::Verified), ItemStatus::CompletedVerified)
        .await
        .unwrap();

    let item = repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::CompletedVerified);
    assert!(item.completed_at.is_some());
    let enrichment = item.enrichment.expect("enrichment written");
    assert_eq!(enrichment.provenance, Provenance::Verified);
    assert_eq!(enrichment.rating, 88);

    let history = repo.transitions(id).await.unwrap();
    let path: Vec<_> = history.iter().map(|t| (t.from, t.to)).collect();
    assert_eq!(
        path,
        vec![
            (ItemStatus::Pending, ItemStatus::Processing),
            (ItemStatus::Processing, ItemStatus::CompletedVerified),
        ]
    );
}

#[tokio::test]
async fn test_pending_item_cannot_complete() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();

    let result = repo
        .commit_result(id, &record(Provenance::Verified), ItemStatus::CompletedVerified)
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let item = repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Pending);
    assert!(item.enrichment.is_none());
    assert!(repo.transitions(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_status_cannot_enter_completed_states() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();
    repo.claim(id).await.unwrap();

    let result = repo
        .update_status(id, ItemStatus::CompletedTheoretical, StatusUpdate::default())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let repo = repository().await;
    let missing = uuid::Uuid::new_v4();

    assert!(repo.get(missing).await.unwrap().is_none());
    let result = repo
        .update_status(missing, ItemStatus::Failed, StatusUpdate::default())
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_release_for_retry_until_attempts_exhausted() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();

    for attempt in 1..=2 {
        assert!(repo.claim(id).await.unwrap());
        let landed = repo.release_for_retry(id, "profile too short", 3).await.unwrap();
        assert_eq!(landed, ItemStatus::Pending, "attempt {}", attempt);
    }

    assert!(repo.claim(id).await.unwrap());
    let landed = repo.release_for_retry(id, "profile too short", 3).await.unwrap();
    assert_eq!(landed, ItemStatus::Failed);

    let item = repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.attempts, 3);
    assert_eq!(item.last_error.as_deref(), Some("profile too short"));
    assert!(item.enrichment.is_none());
    assert_legal_history(&repo.transitions(id).await.unwrap());
}

#[tokio::test]
async fn test_reset_failed_restores_attempt_budget() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();
    repo.claim(id).await.unwrap();
    repo.release_for_retry(id, "boom", 1).await.unwrap();

    assert_eq!(repo.reset_failed().await.unwrap(), 1);
    let item = repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Pending);
    assert_eq!(item.attempts, 0);

    assert_eq!(repo.reset_failed().await.unwrap(), 0);
}

#[tokio::test]
async fn test_requeue_interrupted_keeps_attempts() {
    let repo = repository().await;
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();
    repo.claim(id).await.unwrap();

    assert_eq!(repo.requeue_interrupted().await.unwrap(), 1);
    let item = repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Pending);
    assert_eq!(item.attempts, 1);

    let history = repo.transitions(id).await.unwrap();
    assert_eq!(history.last().map(|t| (t.from, t.to)), Some((ItemStatus::Processing, ItemStatus::Pending)));
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let repo = Arc::new(SqliteItemRepository::new(pool, fixed_clock()));
    let id = repo.enqueue(&descriptor("Barolo Cannubi")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move { repo.claim(id).await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(repo.transitions(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_schema_has_enrichment_columns() {
    let (_dir, pool) = create_test_db().await.unwrap();
    for column in ["status", "attempts", "enrichment", "rating", "provenance", "last_error"] {
        assert!(
            has_column(&pool, "work_items", column).await.unwrap(),
            "work_items.{} missing",
            column
        );
    }
    assert!(has_column(&pool, "generation_cache", "ttl_ms").await.unwrap());
}
