//! Channel polling: discovery, dedupe, bounded backfill, prioritization.

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use super::commands::ProcessEpisodeJob;
use super::error::PipelineError;
use crate::domains::subscription::Subscription;
use crate::kernel::jobs::{JobPriority, JobSpec};
use crate::kernel::WorkerDeps;
use crate::stores::StoreError;

/// Poll one subscribed channel and schedule processing for every newly
/// discovered item. Returns the number of items scheduled.
///
/// Items already known by external id are skipped, items older than one
/// year before the newest fetched item are skipped, and a brand-new
/// channel's first poll accepts at most `backfill_cap` items. Per-item
/// failures are logged and skipped; they never abort the rest of the poll.
pub async fn poll_channel(
    sub: &Subscription,
    deps: &WorkerDeps,
) -> Result<usize, PipelineError> {
    let cfg = &deps.pipeline;

    let items = deps
        .source
        .list_recent(&sub.channel_id, cfg.poll_fetch_limit)
        .await
        .map_err(PipelineError::from_fetch)?;

    // Zero existing rows means this channel was just subscribed; its first
    // poll is a bounded backfill rather than an incremental check.
    let is_new_channel = deps.episodes.count_for_subscription(sub.id).await? == 0;

    let cutoff = items
        .first()
        .and_then(|newest| newest.published_at)
        .map(|newest| newest - ChronoDuration::seconds(cfg.backfill_window.as_secs() as i64));

    let mut scheduled = 0usize;
    for (index, item) in items.iter().enumerate() {
        match deps.episodes.get_by_external_id(&item.external_id).await {
            Ok(_) => continue, // already known
            Err(StoreError::NotFound) => {}
            Err(e) => {
                warn!(
                    external_id = %item.external_id,
                    error = %e,
                    "dedupe lookup failed, skipping item"
                );
                continue;
            }
        }

        if let (Some(cutoff), Some(published_at)) = (cutoff, item.published_at) {
            if published_at < cutoff {
                continue;
            }
        }

        if is_new_channel && scheduled >= cfg.backfill_cap {
            info!(
                subscription_id = sub.id,
                cap = cfg.backfill_cap,
                "backfill cap reached"
            );
            break;
        }

        let episode = match deps.episodes.create(sub.id, &item.external_id).await {
            Ok(episode) => episode,
            // A concurrent poller got there first; the row exists.
            Err(StoreError::Duplicate) => continue,
            Err(e) => {
                warn!(
                    external_id = %item.external_id,
                    error = %e,
                    "failed to create episode, skipping item"
                );
                continue;
            }
        };

        // The newest items surface sooner even when a channel dumps many
        // uploads at once.
        let priority = if index < cfg.expedite_newest {
            JobPriority::Expedited
        } else {
            JobPriority::Normal
        };

        let command = ProcessEpisodeJob {
            external_id: episode.external_id.clone(),
            subscription_id: sub.id,
        };
        let spec = match JobSpec::of(&command) {
            Ok(spec) => spec.with_priority(priority),
            Err(e) => {
                warn!(external_id = %episode.external_id, error = %e, "failed to build processing job");
                continue;
            }
        };
        if let Err(e) = deps.queue.enqueue(spec).await {
            warn!(
                external_id = %episode.external_id,
                error = %e,
                "failed to enqueue processing job"
            );
            continue;
        }

        scheduled += 1;
    }

    info!(
        subscription_id = sub.id,
        channel_id = %sub.channel_id,
        scheduled,
        "channel poll complete"
    );

    Ok(scheduled)
}
