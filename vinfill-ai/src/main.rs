//! vinfill-ai - catalog enrichment daemon
//!
//! Polls the work queue, enriches each item through the confidence gate and
//! the five-stage pipeline (or the fallback generator), and serves a small
//! HTTP control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vinfill_ai::cache::CacheTier;
use vinfill_ai::config::{migrate_key_to_database, resolve_generation_api_key, DaemonSettings};
use vinfill_ai::db::{ItemRepository, SqliteCacheStore, SqliteItemRepository};
use vinfill_ai::generation::{GenerationService, OpenAiCompatibleClient};
use vinfill_ai::utils::{Clock, SystemClock};
use vinfill_ai::AppState;
use vinfill_common::config::{self as common_config, TomlConfig, ROOT_FOLDER_ENV};

/// How long shutdown waits for in-flight items
const DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Command-line arguments for vinfill-ai
#[derive(Parser, Debug)]
#[command(name = "vinfill-ai")]
#[command(about = "AI catalog enrichment daemon")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides TOML)
    #[arg(short, long, env = "VINFILL_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "VINFILL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(common_config::default_config_path);
    let toml_config = common_config::load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    init_logging(&toml_config)?;

    info!("Starting vinfill-ai v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    let root_folder =
        common_config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    let db_path = common_config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = vinfill_ai::db::init_database_pool(&db_path).await?;
    DaemonSettings::ensure_defaults(&db_pool).await?;
    let settings = DaemonSettings::load(&db_pool).await?;
    info!(
        max_concurrent = settings.max_concurrent,
        poll_interval_ms = settings.poll_interval_ms,
        max_attempts = settings.max_attempts,
        "Settings loaded"
    );

    let api_key = match resolve_generation_api_key(&db_pool, &toml_config).await? {
        Some((key, source)) => {
            if let Err(e) = migrate_key_to_database(&key, source, &db_pool, &config_path).await {
                warn!("API key migration failed: {}", e);
            }
            Some(key)
        }
        None => None,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let cache = Arc::new(
        CacheTier::new(
            settings.cache_capacity,
            Some(Arc::new(SqliteCacheStore::new(db_pool.clone()))),
            clock.clone(),
        )
        .with_default_ttl(settings.cache_ttl()),
    );

    let client = OpenAiCompatibleClient::new(toml_config.generation.base_url.clone(), api_key)
        .context("Failed to build generation client")?;
    info!(
        "Generation endpoint {} (models: {})",
        toml_config.generation.base_url,
        toml_config.generation.models.join(", ")
    );
    let generation = Arc::new(
        GenerationService::new(Arc::new(client), cache.clone(), toml_config.generation.models.clone())
            .with_retry_policy(settings.retry_policy())
            .with_rate_limit(settings.requests_per_second)
            .with_cache_ttl(settings.cache_ttl()),
    );

    let repo: Arc<dyn ItemRepository> = Arc::new(SqliteItemRepository::new(db_pool.clone(), clock.clone()));

    let requeued = repo.requeue_interrupted().await?;
    if requeued > 0 {
        warn!("Requeued {} items interrupted by a previous shutdown", requeued);
    }

    let daemon = vinfill_ai::build_daemon(repo.clone(), generation, clock, &settings);
    daemon.start();

    let shutdown = CancellationToken::new();
    let prune_task = tokio::spawn(prune_loop(
        cache.clone(),
        settings.cache_prune_interval(),
        settings.cache_prune_max_age(),
        shutdown.clone(),
    ));

    let state = AppState::new(
        repo,
        cache,
        daemon.clone(),
        settings.cache_prune_max_age_hours,
    );
    let app = vinfill_ai::build_router(state);

    let port = args.port.unwrap_or(toml_config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    daemon.stop();
    shutdown.cancel();
    let _ = prune_task.await;

    info!("Waiting for {} in-flight items", daemon.processing_count());
    if tokio::time::timeout(DRAIN_TIMEOUT, daemon.drain()).await.is_err() {
        warn!(
            "Drain timed out with {} items in flight; they will be requeued on next start",
            daemon.processing_count()
        );
    }

    let stats = daemon.stats();
    info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        rejected = stats.rejected,
        failed = stats.failed,
        "Shutdown complete"
    );
    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins; otherwise the TOML `logging.level`. When `logging.file` is
/// set, output is also appended to that file.
fn init_logging(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| "vinfill_ai=info,tower_http=info".into())
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Periodically drop cache entries older than `max_age`
async fn prune_loop(cache: Arc<CacheTier>, interval: Duration, max_age: Duration, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let removed = cache.prune(max_age).await;
                if removed > 0 {
                    info!("Pruned {} cache entries", removed);
                }
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
