//! The ingestion pipeline: channel polling, item processing, failure
//! classification, and the recurring sweeps.

pub mod backoff;
pub mod classify;
pub mod commands;
pub mod error;
pub mod poller;
pub mod processor;
pub mod sweep;

pub use backoff::BackoffPolicy;
pub use classify::{classify, UpstreamErrorClass};
pub use commands::{
    CheckAllSubscriptionsJob, CheckChannelJob, ProcessEpisodeJob, ReclaimFailedJob,
};
pub use error::PipelineError;
pub use poller::poll_channel;
pub use processor::process_episode;
pub use sweep::{check_all_subscriptions, reclaim_failed_episodes, start_scheduler};

use crate::kernel::jobs::JobRegistry;
use crate::stores::StoreError;

/// Wire the pipeline's handlers into a job registry.
pub fn build_job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();

    registry.register::<CheckChannelJob, _, _>(CheckChannelJob::JOB_TYPE, |job, deps| async move {
        let sub = match deps.subscriptions.find_by_id(job.subscription_id).await {
            Ok(sub) => sub,
            Err(StoreError::NotFound) => {
                // Subscription deleted after the job was enqueued.
                return Err(PipelineError::Validation(format!(
                    "no subscription {}",
                    job.subscription_id
                ))
                .into());
            }
            Err(e) => return Err(PipelineError::from(e).into()),
        };
        poll_channel(&sub, &deps).await?;
        Ok(())
    });

    registry.register::<ProcessEpisodeJob, _, _>(
        ProcessEpisodeJob::JOB_TYPE,
        |job, deps| async move {
            process_episode(&job, &deps).await?;
            Ok(())
        },
    );

    registry.register::<CheckAllSubscriptionsJob, _, _>(
        CheckAllSubscriptionsJob::JOB_TYPE,
        |_job, deps| async move {
            check_all_subscriptions(&deps).await?;
            Ok(())
        },
    );

    registry.register::<ReclaimFailedJob, _, _>(
        ReclaimFailedJob::JOB_TYPE,
        |_job, deps| async move {
            reclaim_failed_episodes(&deps).await?;
            Ok(())
        },
    );

    registry
}
