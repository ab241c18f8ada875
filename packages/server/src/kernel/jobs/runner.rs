//! Job runner service for processing background jobs.
//!
//! The `JobRunner` is a background service that:
//! - Claims ready jobs from the queue
//! - Deserializes and executes them using the registry
//! - Enforces each job's execution deadline
//! - Marks jobs succeeded/failed; the queue handles retry scheduling
//!
//! # Architecture
//!
//! ```text
//! JobRunner
//!     │
//!     ├─► Claim jobs (via JobQueue)
//!     ├─► Execute via JobRegistry (deserialize + call handler)
//!     └─► Mark succeeded/failed (JobQueue schedules backoff retries)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::ErrorKind;
use super::queue::{ClaimedJob, JobQueue};
use super::registry::SharedJobRegistry;
use crate::domains::ingestion::PipelineError;
use crate::kernel::WorkerDeps;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Maximum number of jobs to claim and execute at once. Kept at 1 by
    /// default to stay gentle with the external source; raise it to
    /// process jobs concurrently.
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

impl JobRunnerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Background service that processes jobs from the queue.
pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<WorkerDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<WorkerDeps>,
    ) -> Self {
        Self {
            job_queue,
            registry,
            deps,
            config: JobRunnerConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<WorkerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            job_queue,
            registry,
            deps,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a shutdown handle for graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request shutdown of the runner.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Execute one claimed job under its deadline and record the outcome.
    async fn process_job(&self, job: ClaimedJob) {
        let job_id = job.id;
        let job_type = job.command_type().to_string();
        let deadline = Duration::from_millis(job.job.timeout_ms.max(0) as u64);

        debug!(job_id = %job_id, job_type = %job_type, attempt = job.attempt(), "executing job");

        let result = tokio::time::timeout(
            deadline,
            self.registry.execute(&job, self.deps.clone()),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                if let Err(e) = self.job_queue.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                }
            }
            Ok(Err(e)) => {
                let error_kind = classify_error(&e);
                warn!(job_id = %job_id, job_type = %job_type, error = %e, ?error_kind, "job failed");

                if let Err(mark_err) = self
                    .job_queue
                    .mark_failed(job_id, &e.to_string(), error_kind)
                    .await
                {
                    error!(job_id = %job_id, error = %mark_err, "failed to mark job as failed");
                }
            }
            Err(_) => {
                // The deadline expired; handled exactly like a temporary
                // failure so the queue redelivers with backoff.
                warn!(job_id = %job_id, job_type = %job_type, "job deadline exceeded");
                if let Err(mark_err) = self
                    .job_queue
                    .mark_failed(job_id, "job deadline exceeded", ErrorKind::Retryable)
                    .await
                {
                    error!(job_id = %job_id, error = %mark_err, "failed to mark job as failed");
                }
            }
        }
    }

    /// Run the job runner until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job runner starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            let jobs = match self
                .job_queue
                .claim(&self.config.worker_id, self.config.batch_size)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            // The whole batch executes concurrently; batch_size bounds the
            // concurrency.
            let mut handles = Vec::with_capacity(jobs.len());
            for job in jobs {
                let runner = &self;
                handles.push(async move {
                    runner.process_job(job).await;
                });
            }
            futures::future::join_all(handles).await;
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Run until a shutdown signal is received.
    ///
    /// Convenience method that listens for Ctrl+C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }
}

/// Classify a handler error to determine retry behavior.
///
/// Pipeline errors carry their own classification; anything else (store
/// connectivity, unknown job types surfacing as anyhow errors) defaults to
/// retryable, matching the queue's at-least-once posture.
fn classify_error(error: &anyhow::Error) -> ErrorKind {
    match error.downcast_ref::<PipelineError>() {
        Some(pipeline_error) => pipeline_error.kind(),
        None => ErrorKind::Retryable,
    }
}
