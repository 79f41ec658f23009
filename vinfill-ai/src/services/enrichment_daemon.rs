//! Enrichment daemon
//!
//! A single poll loop claims pending items up to `max_concurrent` and runs each
//! claimed item as its own task. Capacity is reserved before the claim and
//! released by a guard when the task ends, however it ends.
//!
//! `stop()` cancels only the poll loop; item tasks already running finish and
//! persist their result. `drain()` waits for them.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vinfill_common::Result;

use super::item_processor::{ItemOutcome, ItemProcessor};
use crate::db::ItemRepository;
use crate::models::{ItemStatus, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonConfig {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            max_concurrent: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub is_running: bool,
    pub processing_count: usize,
    pub max_concurrent: usize,
}

/// Aggregate item outcomes since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Item tasks that finished
    pub processed: u64,
    /// Verified commits
    pub succeeded: u64,
    /// Gate rejections committed through the fallback
    pub rejected: u64,
    /// Pipeline aborts, fallback errors and persistence failures
    pub failed: u64,
}

impl BatchStats {
    fn record(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Verified => self.succeeded += 1,
            ItemOutcome::Theoretical => self.rejected += 1,
            ItemOutcome::Requeued | ItemOutcome::Failed => self.failed += 1,
        }
    }
}

struct DaemonInner {
    repo: Arc<dyn ItemRepository>,
    processor: Arc<ItemProcessor>,
    config: DaemonConfig,
    processing: AtomicUsize,
    idle: Notify,
    stats: Mutex<BatchStats>,
    poll_token: Mutex<Option<CancellationToken>>,
}

impl DaemonInner {
    fn record(&self, outcome: ItemOutcome) {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(outcome);
    }
}

/// One unit of capacity, held from before the claim until the task ends
struct ProcessingSlot {
    inner: Arc<DaemonInner>,
    /// Owned by a spawned item task
    in_task: bool,
    finished: bool,
}

impl ProcessingSlot {
    /// Take a slot if fewer than `max_concurrent` are in use
    fn reserve(inner: &Arc<DaemonInner>) -> Option<Self> {
        let max = inner.config.max_concurrent;
        inner
            .processing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()?;

        Some(Self {
            inner: inner.clone(),
            in_task: false,
            finished: false,
        })
    }

    /// Record the task's outcome and give the slot back
    fn complete(mut self, outcome: ItemOutcome) {
        self.inner.record(outcome);
        self.finished = true;
    }
}

impl Drop for ProcessingSlot {
    fn drop(&mut self) {
        if self.in_task && !self.finished {
            error!("Item task ended without an outcome");
            self.inner.record(ItemOutcome::Failed);
        }
        self.inner.processing.fetch_sub(1, Ordering::SeqCst);
        self.inner.idle.notify_waiters();
    }
}

#[derive(Clone)]
pub struct EnrichmentDaemon {
    inner: Arc<DaemonInner>,
}

impl EnrichmentDaemon {
    pub fn new(repo: Arc<dyn ItemRepository>, processor: Arc<ItemProcessor>, config: DaemonConfig) -> Self {
        Self {
            inner: Arc::new(DaemonInner {
                repo,
                processor,
                config,
                processing: AtomicUsize::new(0),
                idle: Notify::new(),
                stats: Mutex::new(BatchStats::default()),
                poll_token: Mutex::new(None),
            }),
        }
    }

    /// Start the poll loop; false if it was already running
    pub fn start(&self) -> bool {
        let token = {
            let mut guard = self.inner.poll_token.lock().unwrap_or_else(|e| e.into_inner());
            if guard.as_ref().is_some_and(|t| !t.is_cancelled()) {
                debug!("Daemon already running");
                return false;
            }
            let token = CancellationToken::new();
            *guard = Some(token.clone());
            token
        };

        info!(
            poll_interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            max_concurrent = self.inner.config.max_concurrent,
            "Enrichment daemon started"
        );

        let daemon = self.clone();
        tokio::spawn(async move { daemon.poll_loop(token).await });
        true
    }

    /// Stop claiming new items; false if it was not running
    pub fn stop(&self) -> bool {
        let token = self
            .inner
            .poll_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                info!(
                    in_flight = self.processing_count(),
                    "Enrichment daemon stopped; in-flight items will finish"
                );
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .poll_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    pub fn processing_count(&self) -> usize {
        self.inner.processing.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            is_running: self.is_running(),
            processing_count: self.processing_count(),
            max_concurrent: self.inner.config.max_concurrent,
        }
    }

    pub fn stats(&self) -> BatchStats {
        *self.inner.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One claim cycle; returns the number of items claimed and spawned
    pub async fn run_cycle(&self) -> Result<usize> {
        self.claim_and_spawn(None).await
    }

    /// Wait until no item task is running
    pub async fn drain(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.processing_count() == 0 {
                return;
            }
            idle.await;
        }
    }

    async fn poll_loop(self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }

            if let Err(e) = self.claim_and_spawn(Some(&token)).await {
                error!(error = %e, "Claim cycle failed");
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
        }
        debug!("Poll loop exited");
    }

    async fn claim_and_spawn(&self, token: Option<&CancellationToken>) -> Result<usize> {
        let capacity = self
            .inner
            .config
            .max_concurrent
            .saturating_sub(self.processing_count());
        if capacity == 0 {
            debug!("At capacity, skipping claim cycle");
            return Ok(0);
        }

        let items = self.inner.repo.get_pending(capacity).await?;
        let mut claimed = 0;

        for mut item in items {
            if token.is_some_and(|t| t.is_cancelled()) {
                break;
            }
            let Some(slot) = ProcessingSlot::reserve(&self.inner) else {
                break;
            };

            match self.inner.repo.claim(item.id).await {
                Ok(true) => {
                    item.status = ItemStatus::Processing;
                    item.attempts += 1;
                    info!(item_id = %item.id, item = %item.descriptor.label(), attempt = item.attempts, "Claimed work item");
                    self.spawn_item(item, slot);
                    claimed += 1;
                }
                Ok(false) => {
                    debug!(item_id = %item.id, "Item claimed elsewhere, skipping");
                }
                Err(e) => {
                    error!(item_id = %item.id, error = %e, "Claim failed");
                }
            }
        }

        Ok(claimed)
    }

    fn spawn_item(&self, item: WorkItem, mut slot: ProcessingSlot) {
        slot.in_task = true;
        let processor = self.inner.processor.clone();
        tokio::spawn(async move {
            let outcome = processor.process(&item).await;
            debug!(item_id = %item.id, outcome = ?outcome, "Item task finished");
            slot.complete(outcome);
        });
    }
}
