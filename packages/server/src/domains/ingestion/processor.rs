//! Item processing: drives one episode through the extraction tool.

use chrono::Utc;
use tracing::{info, warn};

use super::commands::ProcessEpisodeJob;
use super::error::PipelineError;
use crate::domains::episode::{CompletedEpisode, EpisodeStatus};
use crate::kernel::WorkerDeps;
use crate::stores::StoreError;

/// Process one discovered item end to end: Pending → Processing →
/// Completed/Failed, or back to the queue on a temporary failure.
pub async fn process_episode(
    job: &ProcessEpisodeJob,
    deps: &WorkerDeps,
) -> Result<(), PipelineError> {
    let episode = match deps.episodes.get_by_external_id(&job.external_id).await {
        Ok(episode) => episode,
        Err(StoreError::NotFound) => {
            // The payload referenced a row that no longer exists; nothing
            // to retry.
            return Err(PipelineError::Validation(format!(
                "no episode for external id {}",
                job.external_id
            )));
        }
        Err(e) => return Err(e.into()),
    };

    deps.episodes
        .set_status(episode.id, EpisodeStatus::Processing)
        .await?;

    // Courtesy pause so a batch of jobs does not hammer the source.
    tokio::time::sleep(deps.pipeline.gentle_delay).await;

    let output_path = deps.audio_dir.join(episode.audio_filename());
    let media = match deps.source.extract(&episode.external_id, &output_path).await {
        Ok(media) => media,
        Err(err) => {
            let classified = PipelineError::from_fetch(err);
            if classified.is_terminal_for_item() {
                warn!(
                    external_id = %episode.external_id,
                    error = %classified,
                    "terminal extraction failure"
                );
                deps.episodes.set_failed(episode.id).await?;
            } else {
                // The queue redelivers with backoff; the row stays in
                // Processing until a later attempt settles it. The reclaim
                // sweep covers rows orphaned by a crashed worker.
                warn!(
                    external_id = %episode.external_id,
                    error = %classified,
                    "temporary extraction failure, leaving for retry"
                );
            }
            return Err(classified);
        }
    };

    // Do not trust the exit status alone: the declared output file must
    // exist with a readable size.
    let audio_size_bytes = match tokio::fs::metadata(&media.output_path).await {
        Ok(meta) => meta.len() as i64,
        Err(e) => {
            deps.episodes.set_failed(episode.id).await?;
            return Err(PipelineError::LocalIo(format!(
                "declared output file {} is unreadable: {e}",
                media.output_path
            )));
        }
    };

    let published_at = media.published_at.unwrap_or_else(Utc::now);

    deps.episodes
        .set_completed(
            episode.id,
            CompletedEpisode {
                title: media.title,
                description: media.description,
                duration_seconds: media.duration_seconds,
                audio_path: media.output_path,
                audio_size_bytes,
                published_at,
            },
        )
        .await?;

    info!(external_id = %episode.external_id, "episode processed");

    Ok(())
}
