// Main entry point for the pipeline worker

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::domains::ingestion::{build_job_registry, BackoffPolicy};
use server_core::kernel::jobs::{JobRunner, JobRunnerConfig, PostgresJobQueue};
use server_core::kernel::WorkerDeps;
use server_core::stores::{PostgresEpisodeStore, PostgresSubscriptionStore};
use server_core::Config;
use ytdlp_client::{YtDlpClient, YtDlpConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ingestion worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    tokio::fs::create_dir_all(&config.audio_dir)
        .await
        .context("Failed to create audio directory")?;

    let source = YtDlpClient::new(YtDlpConfig {
        binary: config.ytdlp_binary.clone(),
        list_timeout: config.pipeline.list_timeout,
        extract_timeout: config.pipeline.extract_timeout,
        cookies_base64: config.cookies_base64.clone(),
    })
    .context("Failed to initialize extraction client")?;

    let backoff = BackoffPolicy::new(config.pipeline.backoff_base, config.pipeline.backoff_cap);
    let queue = Arc::new(PostgresJobQueue::new(pool.clone(), backoff));

    let deps = Arc::new(WorkerDeps {
        episodes: Arc::new(PostgresEpisodeStore::new(pool.clone())),
        subscriptions: Arc::new(PostgresSubscriptionStore::new(pool.clone())),
        source: Arc::new(source),
        queue: queue.clone(),
        audio_dir: config.audio_dir.clone().into(),
        pipeline: config.pipeline.clone(),
    });

    let registry = Arc::new(build_job_registry());
    let runner_config = JobRunnerConfig {
        batch_size: config.pipeline.worker_concurrency,
        ..Default::default()
    };
    let runner = JobRunner::with_config(queue, registry, deps, runner_config);

    runner.run_until_shutdown().await
}
