//! Job-queue test double.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{ErrorKind, Job, JobPriority, JobStatus};
use super::queue::{job_from_spec, ClaimedJob, JobQueue, JobSpec};
use crate::domains::ingestion::BackoffPolicy;

/// What a test observed being enqueued.
#[derive(Debug, Clone)]
pub struct RecordedJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub not_before: Option<DateTime<Utc>>,
}

/// In-memory [`JobQueue`] that records every enqueue and mirrors the
/// Postgres adapter's claim/retry behavior, for scenario tests.
pub struct TestJobQueue {
    jobs: Mutex<Vec<Job>>,
    recorded: Mutex<Vec<RecordedJob>>,
    backoff: BackoffPolicy,
}

impl Default for TestJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TestJobQueue {
    pub fn new() -> Self {
        Self::with_backoff(BackoffPolicy::default())
    }

    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            recorded: Mutex::new(Vec::new()),
            backoff,
        }
    }

    /// Everything enqueued so far, in order.
    pub fn recorded(&self) -> Vec<RecordedJob> {
        self.recorded.lock().unwrap().clone()
    }

    /// Recorded jobs of one type, in order.
    pub fn recorded_of_type(&self, job_type: &str) -> Vec<RecordedJob> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect()
    }

    /// Snapshot of the underlying job table, for retry assertions.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for TestJobQueue {
    async fn enqueue(&self, spec: JobSpec) -> Result<Uuid> {
        let job = job_from_spec(&spec);
        let id = job.id;
        self.recorded.lock().unwrap().push(RecordedJob {
            id,
            job_type: job.job_type.clone(),
            payload: spec.payload,
            priority: spec.priority,
            not_before: spec.not_before,
        });
        self.jobs.lock().unwrap().push(job);
        Ok(id)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut claimed = Vec::new();
        for job in jobs.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if job.is_ready() {
                job.status = JobStatus::Running;
                job.worker_id = Some(worker_id.to_string());
                job.last_run_at = Some(Utc::now());
                claimed.push(ClaimedJob {
                    id: job.id,
                    job: job.clone(),
                });
            }
        }
        Ok(claimed)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("no such job {job_id}"))?;
        job.status = JobStatus::Succeeded;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("no such job {job_id}"))?
            .clone();

        let original = jobs.iter_mut().find(|j| j.id == job_id).unwrap();
        if kind.should_retry() && job.retry_count + 1 < job.max_retries {
            original.status = JobStatus::Failed;
            original.error_message = Some(error.to_string());
            original.error_kind = Some(kind);

            let delay = self.backoff.delay(job.retry_count as u32);
            let retry_at = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
            let retry = job.create_retry(retry_at);
            jobs.push(retry);
        } else {
            original.status = JobStatus::DeadLetter;
            original.error_message = Some(error.to_string());
            original.error_kind = Some(kind);
        }
        Ok(())
    }

    async fn heartbeat(&self, _job_id: Uuid) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::CommandMeta;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Noop {}

    impl CommandMeta for Noop {
        fn command_type(&self) -> &'static str {
            "noop"
        }
    }

    #[tokio::test]
    async fn records_enqueues_and_claims_ready_jobs() {
        let queue = TestJobQueue::new();
        queue.enqueue(JobSpec::of(&Noop {}).unwrap()).await.unwrap();

        assert_eq!(queue.recorded().len(), 1);

        let claimed = queue.claim("w1", 10).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // Running jobs are not claimed twice.
        assert!(queue.claim("w1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delayed_jobs_are_not_claimable_yet() {
        let queue = TestJobQueue::new();
        let spec = JobSpec::of(&Noop {})
            .unwrap()
            .with_not_before(Utc::now() + chrono::Duration::minutes(5));
        queue.enqueue(spec).await.unwrap();

        assert!(queue.claim("w1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retryable_failure_schedules_backoff_retry() {
        let queue = TestJobQueue::new();
        let id = queue.enqueue(JobSpec::of(&Noop {}).unwrap()).await.unwrap();
        queue.claim("w1", 1).await.unwrap();

        queue
            .mark_failed(id, "HTTP Error 429", ErrorKind::Retryable)
            .await
            .unwrap();

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 2);

        // First retry is delayed by the backoff base.
        let retry = jobs.iter().find(|j| j.id != id).unwrap();
        let expected = Utc::now() + chrono::Duration::seconds(5 * 60);
        let actual = retry.next_run_at.unwrap();
        assert!((actual - expected).num_seconds().abs() < 5);
        assert_eq!(retry.retry_count, 1);
    }

    #[tokio::test]
    async fn non_retryable_failure_dead_letters() {
        let queue = TestJobQueue::new();
        let id = queue.enqueue(JobSpec::of(&Noop {}).unwrap()).await.unwrap();
        queue.claim("w1", 1).await.unwrap();

        queue
            .mark_failed(id, "Private video", ErrorKind::NonRetryable)
            .await
            .unwrap();

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::DeadLetter);
    }
}
