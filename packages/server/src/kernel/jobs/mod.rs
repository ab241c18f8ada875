//! Job infrastructure for background command execution.
//!
//! This module provides the kernel-level infrastructure the pipeline needs
//! from its queue collaborator:
//! - [`JobQueue`] - the enqueue/claim/retry contract the core consumes
//! - [`PostgresJobQueue`] - database-backed implementation of that contract
//! - [`JobRegistry`] - maps job type tags to domain handlers
//! - [`JobRunner`] - long-running service that claims and executes jobs
//!
//! # Architecture
//!
//! ```text
//! Scheduler / Poller
//!     │
//!     └─► JobQueue.enqueue(JobSpec)
//!             └─► Insert to DB
//!
//! JobRunner
//!     │
//!     ├─► Claim ready jobs (FOR UPDATE SKIP LOCKED)
//!     ├─► Execute via JobRegistry (deserialize + call handler)
//!     └─► Mark succeeded/failed (retryable failures re-queued with backoff)
//! ```
//!
//! Domain handlers live in their domains; this module only provides the
//! infrastructure.

mod job;
mod queue;
mod registry;
mod runner;
pub mod testing;

pub use job::{ErrorKind, Job, JobPriority, JobStatus};
pub use queue::{ClaimedJob, CommandMeta, JobQueue, JobSpec, PostgresJobQueue};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
pub use testing::TestJobQueue;
