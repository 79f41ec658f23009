//! Configuration resolution for vinfill-ai
//!
//! - Generation API key: Database → ENV → TOML, with write-back to the database
//! - Runtime settings: `settings` table, with built-in defaults for anything unset

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use vinfill_common::config::TomlConfig;
use vinfill_common::time::millis_to_duration;
use vinfill_common::{Error, Result};

use crate::db::settings::{get_generation_api_key, get_setting, set_generation_api_key};
use crate::generation::RetryPolicy;
use crate::services::DaemonConfig;

/// Environment variable holding the generation API key
pub const API_KEY_ENV: &str = "VINFILL_GENERATION_API_KEY";

/// Where a resolved API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Database => "database",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the generation API key from the three configuration tiers
///
/// **Priority:** Database → ENV → TOML. Returns `None` when no tier has a key;
/// keyless operation is valid against local OpenAI-compatible servers.
pub async fn resolve_generation_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<(String, KeySource)>> {
    let db_key = get_generation_api_key(db).await?.filter(|k| is_valid_key(k));
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .generation
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let candidates = [
        (db_key, KeySource::Database),
        (env_key, KeySource::Environment),
        (toml_key, KeySource::Toml),
    ];

    let present: Vec<&str> = candidates
        .iter()
        .filter(|(key, _)| key.is_some())
        .map(|(_, source)| source.as_str())
        .collect();
    if present.len() > 1 {
        warn!(
            "Generation API key found in multiple sources: {}. Using {} (highest priority).",
            present.join(", "),
            present[0]
        );
    }

    let resolved = candidates
        .into_iter()
        .find_map(|(key, source)| key.map(|k| (k, source)));

    match &resolved {
        Some((_, source)) => info!("Generation API key loaded from {}", source.as_str()),
        None => warn!(
            "No generation API key configured (set {} or generation.api_key in TOML); \
             requests will be sent without authorization",
            API_KEY_ENV
        ),
    }

    Ok(resolved)
}

/// Persist a key found in ENV or TOML to the database
///
/// Keys from the environment are also written back to the TOML file so the
/// next start without the variable still finds them. TOML write failures are
/// logged, not returned.
pub async fn migrate_key_to_database(
    key: &str,
    source: KeySource,
    db: &Pool<Sqlite>,
    toml_path: &Path,
) -> Result<()> {
    if source == KeySource::Database {
        return Ok(());
    }

    set_generation_api_key(db, key.to_string()).await?;

    if source == KeySource::Environment {
        let mut config = if toml_path.exists() {
            vinfill_common::config::load_toml_config(toml_path)?
        } else {
            TomlConfig::default()
        };
        config.generation.api_key = Some(key.to_string());

        if let Err(e) = vinfill_common::config::write_toml_config(&config, toml_path) {
            warn!("TOML write failed (database write succeeded): {}", e);
        }
    }

    info!("Generation API key migrated from {} to database", source.as_str());
    Ok(())
}

/// Runtime settings read from the `settings` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonSettings {
    pub poll_interval_ms: u64,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub cache_prune_max_age_hours: u64,
    pub cache_prune_interval_secs: u64,
    pub call_timeout_ms: u64,
    pub retry_base_ms: u64,
    pub max_retries: u32,
    pub requests_per_second: u32,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_concurrent: 3,
            max_attempts: 5,
            cache_capacity: 512,
            cache_ttl_secs: 86_400,
            cache_prune_max_age_hours: 168,
            cache_prune_interval_secs: 3600,
            call_timeout_ms: 60_000,
            retry_base_ms: 1000,
            max_retries: 3,
            requests_per_second: 2,
        }
    }
}

impl DaemonSettings {
    /// Load every setting, falling back to the default for unset keys
    pub async fn load(db: &Pool<Sqlite>) -> Result<Self> {
        let d = Self::default();
        let settings = Self {
            poll_interval_ms: get_setting(db, "poll_interval_ms").await?.unwrap_or(d.poll_interval_ms),
            max_concurrent: get_setting(db, "max_concurrent").await?.unwrap_or(d.max_concurrent),
            max_attempts: get_setting(db, "max_attempts").await?.unwrap_or(d.max_attempts),
            cache_capacity: get_setting(db, "cache_capacity").await?.unwrap_or(d.cache_capacity),
            cache_ttl_secs: get_setting(db, "cache_ttl_secs").await?.unwrap_or(d.cache_ttl_secs),
            cache_prune_max_age_hours: get_setting(db, "cache_prune_max_age_hours")
                .await?
                .unwrap_or(d.cache_prune_max_age_hours),
            cache_prune_interval_secs: get_setting(db, "cache_prune_interval_secs")
                .await?
                .unwrap_or(d.cache_prune_interval_secs),
            call_timeout_ms: get_setting(db, "call_timeout_ms").await?.unwrap_or(d.call_timeout_ms),
            retry_base_ms: get_setting(db, "retry_base_ms").await?.unwrap_or(d.retry_base_ms),
            max_retries: get_setting(db, "max_retries").await?.unwrap_or(d.max_retries),
            requests_per_second: get_setting(db, "requests_per_second")
                .await?
                .unwrap_or(d.requests_per_second),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Write defaults for missing keys so operators can see and edit them
    pub async fn ensure_defaults(db: &Pool<Sqlite>) -> Result<()> {
        let d = Self::default();
        let pairs: [(&str, String); 11] = [
            ("poll_interval_ms", d.poll_interval_ms.to_string()),
            ("max_concurrent", d.max_concurrent.to_string()),
            ("max_attempts", d.max_attempts.to_string()),
            ("cache_capacity", d.cache_capacity.to_string()),
            ("cache_ttl_secs", d.cache_ttl_secs.to_string()),
            ("cache_prune_max_age_hours", d.cache_prune_max_age_hours.to_string()),
            ("cache_prune_interval_secs", d.cache_prune_interval_secs.to_string()),
            ("call_timeout_ms", d.call_timeout_ms.to_string()),
            ("retry_base_ms", d.retry_base_ms.to_string()),
            ("max_retries", d.max_retries.to_string()),
            ("requests_per_second", d.requests_per_second.to_string()),
        ];
        for (key, value) in &pairs {
            vinfill_common::db::ensure_setting(db, key, value).await?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            poll_interval: millis_to_duration(self.poll_interval_ms),
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            call_timeout: millis_to_duration(self.call_timeout_ms),
            retry_base: millis_to_duration(self.retry_base_ms),
            max_retries: self.max_retries,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_prune_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_prune_max_age_hours * 3600)
    }

    pub fn cache_prune_interval(&self) -> Duration {
        Duration::from_secs(self.cache_prune_interval_secs)
    }
}
