//! Two-level generation cache
//!
//! Memory LRU in front of a persistent [`CacheStore`]. Keys are the operation
//! prefix plus the SHA-256 of (prefix, canonical input), so identical prompts
//! map to identical keys across restarts.
//!
//! Persistent failures never surface to callers: reads degrade to a miss,
//! writes and prunes are logged at WARN.

pub mod lru;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::CacheStore;
use crate::utils::Clock;
use lru::LruMap;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One cached value with its freshness window
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Fresh while `now - stored_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.stored_at).num_milliseconds();
        age_ms < self.ttl.as_millis() as i64
    }
}

/// Counters since startup
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Build the storage key for `(prefix, input)`
pub fn cache_key(prefix: &str, input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update([0u8]);
    hasher.update(input.as_bytes());
    format!("{}:{:x}", prefix, hasher.finalize())
}

pub struct CacheTier {
    memory: Mutex<LruMap<String, CacheEntry>>,
    store: Option<Arc<dyn CacheStore>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheTier {
    pub fn new(capacity: usize, store: Option<Arc<dyn CacheStore>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(LruMap::new(capacity)),
            store,
            clock,
            default_ttl: DEFAULT_TTL,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Memory first, then the persistent store; expired entries read as absent
    pub async fn get(&self, prefix: &str, input: &str) -> Option<String> {
        let key = cache_key(prefix, input);
        let now = self.clock.now();

        if let Some(value) = self.get_from_memory(&key, now) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit (memory)");
            return Some(value);
        }

        let Some(store) = &self.store else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match store.load(&key).await {
            Ok(Some(entry)) if entry.is_fresh(now) => {
                let value = entry.value.clone();
                self.insert_memory(entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit (persistent)");
                Some(value)
            }
            Ok(Some(_)) => {
                if let Err(e) = store.remove(&key).await {
                    warn!(key = %key, error = %e, "Failed to remove expired cache entry");
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss (expired)");
                None
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Persistent cache read failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store in memory synchronously, then best-effort in the persistent store
    pub async fn set(&self, prefix: &str, input: &str, value: String, ttl: Option<Duration>) {
        let entry = CacheEntry {
            key: cache_key(prefix, input),
            value,
            stored_at: self.clock.now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };

        self.insert_memory(entry.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store.store(&entry).await {
                warn!(key = %entry.key, error = %e, "Persistent cache write failed");
            }
        }
    }

    /// Drop `(prefix, input)` from both tiers
    pub async fn invalidate(&self, prefix: &str, input: &str) {
        let key = cache_key(prefix, input);
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);

        if let Some(store) = &self.store {
            if let Err(e) = store.remove(&key).await {
                warn!(key = %key, error = %e, "Persistent cache remove failed");
            }
        }
        debug!(key = %key, "Cache entry invalidated");
    }

    /// Return the cached value, or run `producer` once and cache its success
    ///
    /// Producer errors are returned as-is and never cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        prefix: &str,
        input: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(value) = self.get(prefix, input).await {
            return Ok(value);
        }

        let value = producer().await?;
        self.set(prefix, input, value.clone(), ttl).await;
        Ok(value)
    }

    /// Delete persistent entries stored more than `max_age` ago
    ///
    /// Memory entries age out through TTL and eviction. Returns 0 on failure.
    pub async fn prune(&self, max_age: Duration) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };

        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        match store.prune(cutoff).await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!(removed = count, "Pruned persistent cache entries");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "Cache prune failed");
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: memory.len(),
            capacity: memory.capacity(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn get_from_memory(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        let key = key.to_string();

        let fresh = memory.get(&key).map(|entry| entry.is_fresh(now))?;
        if fresh {
            memory.get(&key).map(|entry| entry.value.clone())
        } else {
            memory.remove(&key);
            None
        }
    }

    fn insert_memory(&self, entry: CacheEntry) {
        let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((evicted, _)) = memory.insert(entry.key.clone(), entry) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %evicted, "Evicted least recently used cache entry");
        }
    }
}
