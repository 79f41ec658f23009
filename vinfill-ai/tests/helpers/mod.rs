//! Test Helper Utilities
//!
//! Shared utilities for testing vinfill-ai

#![allow(dead_code)]

pub mod db_utils;
pub mod scripts;

pub use db_utils::{create_test_db, get_table_columns, has_column, memory_pool};
pub use scripts::{
    descriptor, full_script, gate_reply, high_confidence, low_confidence, red_profile,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;
use vinfill_ai::cache::CacheTier;
use vinfill_ai::config::DaemonSettings;
use vinfill_ai::db::{ItemRepository, SqliteCacheStore, SqliteItemRepository};
use vinfill_ai::generation::{GenerationService, RetryPolicy, ScriptedGenerationClient};
use vinfill_ai::services::EnrichmentDaemon;
use vinfill_ai::utils::ManualClock;

/// Everything a daemon-level test needs, wired the way the binary wires it
pub struct Harness {
    pub pool: SqlitePool,
    pub repo: Arc<dyn ItemRepository>,
    pub client: Arc<ScriptedGenerationClient>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CacheTier>,
    pub generation: Arc<GenerationService>,
    pub daemon: EnrichmentDaemon,
    pub settings: DaemonSettings,
}

/// Settings tuned for tests: fast polling, no pacing, one quick retry
pub fn test_settings() -> DaemonSettings {
    DaemonSettings {
        poll_interval_ms: 20,
        requests_per_second: 0,
        retry_base_ms: 1,
        max_retries: 1,
        call_timeout_ms: 2000,
        ..DaemonSettings::default()
    }
}

pub fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
}

pub async fn harness(client: ScriptedGenerationClient) -> Harness {
    harness_with(client, test_settings()).await
}

pub async fn harness_with(client: ScriptedGenerationClient, settings: DaemonSettings) -> Harness {
    let pool = memory_pool().await;
    let clock = fixed_clock();
    let client = Arc::new(client);

    let cache = Arc::new(
        CacheTier::new(
            settings.cache_capacity,
            Some(Arc::new(SqliteCacheStore::new(pool.clone()))),
            clock.clone(),
        )
        .with_default_ttl(settings.cache_ttl()),
    );

    let generation = Arc::new(
        GenerationService::new(client.clone(), cache.clone(), vec!["primary-model".to_string()])
            .with_retry_policy(RetryPolicy {
                call_timeout: Duration::from_millis(settings.call_timeout_ms),
                retry_base: Duration::from_millis(settings.retry_base_ms),
                max_retries: settings.max_retries,
            })
            .with_rate_limit(settings.requests_per_second),
    );

    let repo: Arc<dyn ItemRepository> = Arc::new(SqliteItemRepository::new(pool.clone(), clock.clone()));
    let daemon = vinfill_ai::build_daemon(repo.clone(), generation.clone(), clock.clone(), &settings);

    Harness {
        pool,
        repo,
        client,
        clock,
        cache,
        generation,
        daemon,
        settings,
    }
}

/// Poll until `condition` holds or `timeout` elapses
pub async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
