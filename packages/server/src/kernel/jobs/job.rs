//! Job model for background command execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
}

/// Queue priority class. Expedited jobs dequeue before normal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
pub enum JobPriority {
    Expedited,
    #[default]
    Normal,
}

impl JobPriority {
    /// Convert to integer for ordering (lower = higher priority)
    pub fn as_i16(&self) -> i16 {
        match self {
            JobPriority::Expedited => 0,
            JobPriority::Normal => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub job_type: String,

    // Payload
    #[builder(default, setter(strip_option))]
    pub args: Option<serde_json::Value>,

    // Policies
    #[builder(default)]
    pub priority: JobPriority,

    // Execution settings
    #[builder(default = 3)]
    pub max_retries: i32,
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default = 900_000)] // 15 minutes
    pub timeout_ms: i64,
    #[builder(default = 60_000)] // 1 minute
    pub lease_duration_ms: i64,

    // Scheduling
    #[builder(default, setter(strip_option))]
    pub next_run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub last_run_at: Option<DateTime<Utc>>,

    // Lease management
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    // State
    #[builder(default)]
    pub status: JobStatus,

    // Error tracking
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Check if the job is ready to run
    pub fn is_ready(&self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }

        if self.retry_count >= self.max_retries {
            return false;
        }

        match self.next_run_at {
            None => true,
            Some(next_run) => next_run <= Utc::now(),
        }
    }

    /// Create a retry job from a failed job
    pub fn create_retry(&self, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: self.job_type.clone(),
            args: self.args.clone(),
            priority: self.priority,
            max_retries: self.max_retries,
            retry_count: self.retry_count + 1,
            timeout_ms: self.timeout_ms,
            lease_duration_ms: self.lease_duration_ms,
            next_run_at: Some(scheduled_for),
            last_run_at: None,
            lease_expires_at: None,
            worker_id: None,
            status: JobStatus::Pending,
            error_message: None,
            error_kind: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::builder().job_type("test_job".to_string()).build()
    }

    #[test]
    fn new_job_has_default_max_retries_of_3() {
        let job = sample_job();
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn new_job_starts_with_pending_status() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, JobPriority::Normal);
    }

    #[test]
    fn is_ready_pending_job_without_schedule() {
        let job = sample_job();
        assert!(job.is_ready());
    }

    #[test]
    fn is_ready_running_job_is_not_ready() {
        let mut job = sample_job();
        job.status = JobStatus::Running;
        assert!(!job.is_ready());
    }

    #[test]
    fn is_ready_future_job_is_not_ready() {
        let mut job = sample_job();
        job.next_run_at = Some(Utc::now() + chrono::Duration::minutes(5));
        assert!(!job.is_ready());
    }

    #[test]
    fn exhausted_job_is_not_ready() {
        let mut job = sample_job();
        job.retry_count = job.max_retries;
        assert!(!job.is_ready());
    }

    #[test]
    fn retryable_error_should_retry() {
        assert!(ErrorKind::Retryable.should_retry());
        assert!(!ErrorKind::NonRetryable.should_retry());
    }

    #[test]
    fn priority_ordering_is_correct() {
        assert!(JobPriority::Expedited.as_i16() < JobPriority::Normal.as_i16());
    }

    #[test]
    fn retry_job_carries_payload_and_bumps_attempt() {
        let mut job = sample_job();
        job.args = Some(serde_json::json!({"subscription_id": 7}));
        let run_at = Utc::now() + chrono::Duration::minutes(5);

        let retry = job.create_retry(run_at);
        assert_ne!(retry.id, job.id);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.args, job.args);
        assert_eq!(retry.next_run_at, Some(run_at));
        assert_eq!(retry.status, JobStatus::Pending);
    }
}
