//! Job queue contract and its PostgreSQL adapter.
//!
//! The pipeline only depends on the [`JobQueue`] trait: a durable,
//! at-least-once queue with priority classes, delayed delivery, and
//! backoff-driven redelivery of retryable failures. [`PostgresJobQueue`] is
//! the default collaborator implementation - a single table claimed with
//! `FOR UPDATE SKIP LOCKED`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::job::{ErrorKind, Job, JobPriority};
use crate::domains::ingestion::BackoffPolicy;

/// Metadata a command supplies when it is turned into a [`JobSpec`].
pub trait CommandMeta {
    /// The job type tag carried on the queue.
    fn command_type(&self) -> &'static str;

    fn priority(&self) -> JobPriority {
        JobPriority::Normal
    }

    /// Maximum delivery attempts before the job is dead-lettered.
    fn max_retries(&self) -> i32 {
        3
    }

    /// Execution deadline for one delivery of this command.
    fn timeout_ms(&self) -> i64 {
        900_000
    }
}

/// A serialized command ready for the queue.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: &'static str,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub max_retries: i32,
    pub timeout_ms: i64,
    /// Earliest delivery time; immediate when unset.
    pub not_before: Option<DateTime<Utc>>,
}

impl JobSpec {
    /// Serialize a command into a spec.
    pub fn of<C>(command: &C) -> Result<Self>
    where
        C: CommandMeta + Serialize,
    {
        Ok(Self {
            job_type: command.command_type(),
            payload: serde_json::to_value(command)?,
            priority: command.priority(),
            max_retries: command.max_retries(),
            timeout_ms: command.timeout_ms(),
            not_before: None,
        })
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Delay the earliest delivery of this job.
    pub fn with_not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }
}

/// A claimed job ready for execution.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    /// Deserialize the command payload.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        let args = self
            .job
            .args
            .as_ref()
            .ok_or_else(|| anyhow!("job {} has no args", self.id))?;
        serde_json::from_value(args.clone())
            .map_err(|e| anyhow!("failed to deserialize command: {}", e))
    }

    pub fn command_type(&self) -> &str {
        &self.job.job_type
    }

    /// Prior failed attempts for this job, as counted by the queue.
    pub fn attempt(&self) -> i32 {
        self.job.retry_count
    }
}

/// Trait for job queue operations.
///
/// The queue guarantees at-least-once delivery: each job is leased to one
/// worker at a time, and expired leases are re-claimed. On a retryable
/// failure the job is redelivered after the backoff delay for its current
/// attempt count, up to `max_retries`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job; delivery honors `spec.not_before` when set.
    /// Returns a handle to the created job.
    async fn enqueue(&self, spec: JobSpec) -> Result<Uuid>;

    /// Claim up to `limit` ready jobs for this worker.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` (or an equivalent) for concurrent-safe
    /// claiming, and also recovers jobs whose lease has expired.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;

    /// Mark a job as successfully completed.
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as failed with an error.
    ///
    /// If the kind is retryable and attempts remain, a successor job is
    /// scheduled after the backoff delay. Otherwise the job dead-letters.
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;

    /// Extend the lease for a running job (heartbeat).
    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;
}

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    pool: PgPool,
    backoff: BackoffPolicy,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, backoff: BackoffPolicy) -> Self {
        Self { pool, backoff }
    }

    async fn find(&self, job_id: Uuid) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(job)
    }

    async fn insert(&self, job: &Job) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, job_type, args, priority, max_retries, retry_count,
                timeout_ms, lease_duration_ms, next_run_at, last_run_at,
                lease_expires_at, worker_id, status, error_message, error_kind,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.args)
        .bind(job.priority)
        .bind(job.max_retries)
        .bind(job.retry_count)
        .bind(job.timeout_ms)
        .bind(job.lease_duration_ms)
        .bind(job.next_run_at)
        .bind(job.last_run_at)
        .bind(job.lease_expires_at)
        .bind(&job.worker_id)
        .bind(job.status)
        .bind(&job.error_message)
        .bind(job.error_kind)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job.id)
    }
}

/// Build the job record for a spec. The lease is sized from the execution
/// deadline so a long-running job is not re-claimed mid-run.
pub(crate) fn job_from_spec(spec: &JobSpec) -> Job {
    let mut job = Job::builder()
        .job_type(spec.job_type.to_string())
        .args(spec.payload.clone())
        .priority(spec.priority)
        .max_retries(spec.max_retries)
        .timeout_ms(spec.timeout_ms)
        .lease_duration_ms(spec.timeout_ms + 60_000)
        .build();
    job.next_run_at = spec.not_before;
    job
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, spec: JobSpec) -> Result<Uuid> {
        let job = job_from_spec(&spec);
        self.insert(&job).await
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE
                    (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW()) AND retry_count < max_retries)
                    OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY priority, COALESCE(next_run_at, created_at)
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET
                status = 'running',
                last_run_at = NOW(),
                lease_expires_at = NOW() + (lease_duration_ms::TEXT || ' milliseconds')::INTERVAL,
                worker_id = $2,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs
            .into_iter()
            .map(|job| ClaimedJob { id: job.id, job })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = self.find(job_id).await?;

        if kind.should_retry() && job.retry_count + 1 < job.max_retries {
            // Schedule a successor after the backoff delay for this attempt.
            let delay = self.backoff.delay(job.retry_count as u32);
            let retry_at = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);

            let retry_job = job.create_retry(retry_at);
            self.insert(&retry_job).await?;

            info!(
                job_id = %job_id,
                job_type = %job.job_type,
                retry_at = %retry_at,
                "scheduled retry for failed job"
            );

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    error_message = $1,
                    error_kind = $2,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            // No retries left, or non-retryable - dead letter.
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'dead_letter',
                    error_message = $1,
                    error_kind = $2,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + (lease_duration_ms::TEXT || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
