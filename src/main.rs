//! Genesis integration service.
//!
//! Main entry point. Initializes all subsystems and coordinates
//! graceful startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use genesis_api::{auth::PgTokenStore, AppState, Config, TokenValidator};
use genesis_cache::{CacheService, MemoryBackend};
use genesis_core::{Clock, RealClock, Storage};
use genesis_jobs::{
    client::HttpGenesisClient,
    queue::MemoryQueue,
    registry::HandlerRegistry,
    storage::PostgresJobStorage,
    sync::SyncProcessor,
    webhook::{recover_unfinished, TracingAlertSink, WebhookProcessor},
    worker_pool::WorkerPool,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Genesis integration service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        workers = config.worker_pool_size,
        "Configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    sqlx::migrate!("./migrations").run(&pool).await.context("Failed to run migrations")?;
    info!("Database migrations completed");

    let clock: Arc<dyn Clock> = Arc::new(RealClock);
    let storage = Arc::new(Storage::new(pool.clone()));
    let job_storage = Arc::new(PostgresJobStorage::new(storage.clone()));
    let queue = Arc::new(MemoryQueue::new(clock.clone()));
    let cache = Arc::new(CacheService::new(
        Arc::new(MemoryBackend::new(clock.clone())),
        config.to_cache_config(),
    ));

    let processor = Arc::new(WebhookProcessor::new(
        job_storage.clone(),
        queue.clone(),
        Arc::new(HandlerRegistry::with_defaults()),
        config.to_retry_policy(),
        Arc::new(TracingAlertSink),
    ));

    let shutdown_token = CancellationToken::new();
    let mut workers = WorkerPool::new(
        processor,
        queue.clone(),
        config.worker_pool_size,
        shutdown_token.clone(),
    );
    workers.spawn_workers().await;

    recover_unfinished(job_storage.as_ref(), queue.as_ref(), 1000)
        .await
        .context("Failed to recover unfinished webhook jobs")?;

    let client = Arc::new(
        HttpGenesisClient::new(config.to_client_config())
            .context("Failed to build Genesis API client")?,
    );
    let sync =
        Arc::new(SyncProcessor::new(job_storage.clone(), client, cache, config.to_sync_ttls()));

    let validator = Arc::new(TokenValidator::new(
        Arc::new(PgTokenStore::new(storage.api_tokens.clone())),
        clock,
    ));
    let state =
        AppState { storage, webhooks: job_storage, queue: queue.clone(), sync, validator };
    let addr = config.parse_server_addr()?;

    info!(addr = %addr, "Genesis is ready to receive webhooks");
    if let Err(e) = genesis_api::start_server(state, addr).await {
        error!(error = %e, "Server failed");
    }

    info!("Shutdown started, draining webhook workers");
    queue.close();
    if let Err(e) = workers.shutdown_graceful(Duration::from_secs(30)).await {
        warn!(error = %e, "Worker pool did not drain in time");
    }

    pool.close().await;
    info!("Database connections closed");

    info!("Genesis shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,genesis=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
