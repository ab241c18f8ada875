//! Recurring sweeps: poll-all and reclaim-failed.
//!
//! The cron triggers only enqueue the corresponding sweep job; the worker
//! does the actual work. Poll-all runs hourly; reclaim runs every six
//! hours, a deliberately gentle cadence so the external source is not
//! hammered by mass retries.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use super::commands::{CheckAllSubscriptionsJob, CheckChannelJob, ProcessEpisodeJob, ReclaimFailedJob};
use crate::config::PipelineConfig;
use crate::kernel::jobs::{JobPriority, JobQueue, JobSpec};
use crate::kernel::WorkerDeps;

/// Enqueue one expedited channel-check job per active subscription.
///
/// One subscription's enqueue failure never stops the others.
pub async fn check_all_subscriptions(deps: &WorkerDeps) -> Result<usize> {
    let subscriptions = deps.subscriptions.list_all().await?;

    let mut enqueued = 0usize;
    for sub in &subscriptions {
        let command = CheckChannelJob {
            subscription_id: sub.id,
        };
        let spec = match JobSpec::of(&command) {
            Ok(spec) => spec.with_priority(JobPriority::Expedited),
            Err(e) => {
                warn!(subscription_id = sub.id, error = %e, "failed to build channel check job");
                continue;
            }
        };
        if let Err(e) = deps.queue.enqueue(spec).await {
            warn!(subscription_id = sub.id, error = %e, "failed to enqueue channel check");
            continue;
        }
        enqueued += 1;
    }

    info!(
        total = subscriptions.len(),
        enqueued, "subscription sweep complete"
    );
    Ok(enqueued)
}

/// Reset aged Failed rows (and Processing rows orphaned by a dead worker)
/// to Pending and re-enqueue them, staggering each job's earliest delivery
/// so the batch does not fire at once. Rows at the reclaim-attempt bound
/// are left alone for good.
pub async fn reclaim_failed_episodes(deps: &WorkerDeps) -> Result<usize> {
    let cfg = &deps.pipeline;

    let mut rows = deps
        .episodes
        .list_failed_older_than(cfg.reclaim_min_age, cfg.reclaim_batch)
        .await?;
    let stale = deps
        .episodes
        .list_stale_processing(cfg.stale_processing_age, cfg.reclaim_batch)
        .await?;
    rows.extend(stale);

    let mut reclaimed = 0usize;
    for episode in rows {
        if episode.reclaim_count >= cfg.reclaim_max_attempts {
            // Reclaiming has not helped this row; abandon it.
            continue;
        }

        if let Err(e) = deps.episodes.reset_for_reclaim(episode.id).await {
            warn!(external_id = %episode.external_id, error = %e, "failed to reset episode for reclaim");
            continue;
        }

        let command = ProcessEpisodeJob {
            external_id: episode.external_id.clone(),
            subscription_id: episode.subscription_id,
        };
        let not_before = Utc::now()
            + ChronoDuration::seconds(cfg.reclaim_stagger.as_secs() as i64 * reclaimed as i64);
        let spec = match JobSpec::of(&command) {
            Ok(spec) => spec.with_not_before(not_before),
            Err(e) => {
                warn!(external_id = %episode.external_id, error = %e, "failed to build reclaim job");
                continue;
            }
        };
        if let Err(e) = deps.queue.enqueue(spec).await {
            warn!(external_id = %episode.external_id, error = %e, "failed to re-enqueue reclaimed episode");
            continue;
        }

        reclaimed += 1;
    }

    info!(reclaimed, "reclaim sweep complete");
    Ok(reclaimed)
}

/// Register both recurring sweep triggers with the cron scheduler.
pub async fn start_scheduler(
    queue: Arc<dyn JobQueue>,
    pipeline: &PipelineConfig,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let poll_queue = queue.clone();
    let poll_job = Job::new_async(pipeline.poll_all_cron.as_str(), move |_uuid, _lock| {
        let queue = poll_queue.clone();
        Box::pin(async move {
            if let Err(e) = enqueue_sweep_job(&queue, &CheckAllSubscriptionsJob {}).await {
                error!("failed to enqueue subscription sweep: {}", e);
            }
        })
    })?;
    scheduler.add(poll_job).await?;

    let reclaim_queue = queue.clone();
    let reclaim_job = Job::new_async(pipeline.reclaim_cron.as_str(), move |_uuid, _lock| {
        let queue = reclaim_queue.clone();
        Box::pin(async move {
            if let Err(e) = enqueue_sweep_job(&queue, &ReclaimFailedJob {}).await {
                error!("failed to enqueue reclaim sweep: {}", e);
            }
        })
    })?;
    scheduler.add(reclaim_job).await?;

    scheduler.start().await?;

    info!(
        poll_all = %pipeline.poll_all_cron,
        reclaim = %pipeline.reclaim_cron,
        "sweep scheduler started"
    );
    Ok(scheduler)
}

async fn enqueue_sweep_job<C>(queue: &Arc<dyn JobQueue>, command: &C) -> Result<()>
where
    C: crate::kernel::jobs::CommandMeta + serde::Serialize,
{
    queue.enqueue(JobSpec::of(command)?).await?;
    Ok(())
}
