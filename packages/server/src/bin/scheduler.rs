// Main entry point for the sweep scheduler

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::domains::ingestion::{start_scheduler, BackoffPolicy};
use server_core::kernel::jobs::{JobQueue, PostgresJobQueue};
use server_core::Config;

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

    tracing::info!("Starting sweep scheduler");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let backoff = BackoffPolicy::new(config.pipeline.backoff_base, config.pipeline.backoff_cap);
    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pool, backoff));

    let mut scheduler = start_scheduler(queue, &config.pipeline)
        .await
        .context("Failed to start sweep scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("received shutdown signal");
    scheduler.shutdown().await?;

    Ok(())
}
