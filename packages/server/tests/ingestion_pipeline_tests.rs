//! Scenario tests for the ingestion pipeline, run against the in-memory
//! stores, the mock source client, and the recording job queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use server_core::config::PipelineConfig;
use server_core::domains::episode::EpisodeStatus;
use server_core::domains::ingestion::commands::{CheckChannelJob, ProcessEpisodeJob};
use server_core::domains::ingestion::{
    check_all_subscriptions, poll_channel, process_episode, reclaim_failed_episodes, PipelineError,
};
use server_core::domains::subscription::Subscription;
use server_core::kernel::jobs::{ErrorKind, JobPriority, TestJobQueue};
use server_core::kernel::WorkerDeps;
use server_core::stores::{
    EpisodeStore, MemoryEpisodeStore, MemorySubscriptionStore, SubscriptionStore,
};
use ytdlp_client::{ChannelItem, ExtractedMedia, FetchError, MockSourceClient};

struct Harness {
    deps: WorkerDeps,
    episodes: Arc<MemoryEpisodeStore>,
    subscriptions: Arc<MemorySubscriptionStore>,
    queue: Arc<TestJobQueue>,
}

fn harness(source: MockSourceClient) -> Harness {
    let episodes = Arc::new(MemoryEpisodeStore::new());
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    let queue = Arc::new(TestJobQueue::new());

    let mut pipeline = PipelineConfig::default();
    // No courtesy pause in tests.
    pipeline.gentle_delay = Duration::ZERO;

    let deps = WorkerDeps {
        episodes: episodes.clone(),
        subscriptions: subscriptions.clone(),
        source: Arc::new(source),
        queue: queue.clone(),
        audio_dir: std::env::temp_dir(),
        pipeline,
    };

    Harness {
        deps,
        episodes,
        subscriptions,
        queue,
    }
}

async fn subscribe(harness: &Harness) -> Subscription {
    harness
        .subscriptions
        .create(1, "test-channel", "Test Channel")
        .await
        .unwrap()
}

/// `count` recent items, newest first, one hour apart.
fn recent_items(count: usize) -> Vec<ChannelItem> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            ChannelItem::new(format!("vid{i}"))
                .with_title(format!("Video {i}"))
                .with_published_at(now - ChronoDuration::hours(i as i64))
        })
        .collect()
}

// ============================================================================
// Channel poller
// ============================================================================

#[tokio::test]
async fn new_channel_backfill_is_capped_at_fifty() {
    let h = harness(MockSourceClient::new().with_listing(recent_items(60)));
    let sub = subscribe(&h).await;

    let scheduled = poll_channel(&sub, &h.deps).await.unwrap();

    assert_eq!(scheduled, 50);
    assert_eq!(h.episodes.all().len(), 50);

    let jobs = h.queue.recorded_of_type(ProcessEpisodeJob::JOB_TYPE);
    assert_eq!(jobs.len(), 50);

    // The newest ten items by source-recency index are expedited.
    for (i, job) in jobs.iter().enumerate() {
        let expected = if i < 10 {
            JobPriority::Expedited
        } else {
            JobPriority::Normal
        };
        assert_eq!(job.priority, expected, "job {i}");
    }
}

#[tokio::test]
async fn existing_channel_skips_known_items() {
    let h = harness(MockSourceClient::new().with_listing(recent_items(5)));
    let sub = subscribe(&h).await;

    // Three of the five are already known.
    for i in 0..3 {
        h.episodes.create(sub.id, &format!("vid{i}")).await.unwrap();
    }

    let scheduled = poll_channel(&sub, &h.deps).await.unwrap();

    assert_eq!(scheduled, 2);
    assert_eq!(h.episodes.all().len(), 5);
    assert_eq!(
        h.queue.recorded_of_type(ProcessEpisodeJob::JOB_TYPE).len(),
        2
    );
}

#[tokio::test]
async fn items_older_than_the_backfill_window_are_skipped() {
    let now = Utc::now();
    let items = vec![
        ChannelItem::new("fresh").with_published_at(now),
        ChannelItem::new("ancient").with_published_at(now - ChronoDuration::days(2 * 365)),
    ];
    let h = harness(MockSourceClient::new().with_listing(items));
    let sub = subscribe(&h).await;

    let scheduled = poll_channel(&sub, &h.deps).await.unwrap();

    assert_eq!(scheduled, 1);
    let rows = h.episodes.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].external_id, "fresh");
}

#[tokio::test]
async fn undated_items_are_accepted() {
    let now = Utc::now();
    let items = vec![
        ChannelItem::new("dated").with_published_at(now),
        ChannelItem::new("undated"),
    ];
    let h = harness(MockSourceClient::new().with_listing(items));
    let sub = subscribe(&h).await;

    let scheduled = poll_channel(&sub, &h.deps).await.unwrap();
    assert_eq!(scheduled, 2);
}

#[tokio::test]
async fn temporary_fetch_failure_is_retryable() {
    let h = harness(MockSourceClient::new().with_list_error(FetchError::Tool {
        output: "HTTP Error 429: Too Many Requests".to_string(),
    }));
    let sub = subscribe(&h).await;

    let err = poll_channel(&sub, &h.deps).await.unwrap_err();
    assert!(matches!(err, PipelineError::TemporaryUpstream { .. }));
    assert_eq!(err.kind(), ErrorKind::Retryable);
}

#[tokio::test]
async fn permanent_fetch_failure_is_not_retryable() {
    let h = harness(MockSourceClient::new().with_list_error(FetchError::Tool {
        output: "HTTP Error 404: Not Found".to_string(),
    }));
    let sub = subscribe(&h).await;

    let err = poll_channel(&sub, &h.deps).await.unwrap_err();
    assert!(matches!(err, PipelineError::PermanentUpstream { .. }));
    assert_eq!(err.kind(), ErrorKind::NonRetryable);
}

// ============================================================================
// Item processor
// ============================================================================

fn process_job(external_id: &str, subscription_id: i64) -> ProcessEpisodeJob {
    ProcessEpisodeJob {
        external_id: external_id.to_string(),
        subscription_id,
    }
}

#[tokio::test]
async fn successful_extraction_completes_the_episode() {
    // The declared output file must really exist.
    let output_path = std::env::temp_dir().join(format!("episode_test_{}.m4a", Uuid::new_v4()));
    std::fs::write(&output_path, b"fake audio bytes").unwrap();

    let published = Utc::now() - ChronoDuration::days(3);
    let media = ExtractedMedia {
        external_id: "vid1".to_string(),
        title: "A Title".to_string(),
        description: "A description".to_string(),
        duration_seconds: 321,
        output_path: output_path.display().to_string(),
        published_at: Some(published),
    };
    let h = harness(MockSourceClient::new().with_extraction(media));
    let sub = subscribe(&h).await;
    let episode = h.episodes.create(sub.id, "vid1").await.unwrap();

    process_episode(&process_job("vid1", sub.id), &h.deps)
        .await
        .unwrap();

    let row = h.episodes.get(episode.id).unwrap();
    assert_eq!(row.status, EpisodeStatus::Completed);
    assert_eq!(row.title.as_deref(), Some("A Title"));
    assert_eq!(row.duration_seconds, Some(321));
    assert_eq!(row.audio_size_bytes, Some(16));
    assert_eq!(row.published_at, Some(published));

    std::fs::remove_file(&output_path).unwrap();
}

#[tokio::test]
async fn missing_publish_date_falls_back_to_now() {
    let output_path = std::env::temp_dir().join(format!("episode_test_{}.m4a", Uuid::new_v4()));
    std::fs::write(&output_path, b"x").unwrap();

    let media = ExtractedMedia {
        external_id: "vid1".to_string(),
        title: "T".to_string(),
        description: String::new(),
        duration_seconds: 1,
        output_path: output_path.display().to_string(),
        published_at: None,
    };
    let h = harness(MockSourceClient::new().with_extraction(media));
    let sub = subscribe(&h).await;
    let episode = h.episodes.create(sub.id, "vid1").await.unwrap();

    process_episode(&process_job("vid1", sub.id), &h.deps)
        .await
        .unwrap();

    let row = h.episodes.get(episode.id).unwrap();
    let published = row.published_at.unwrap();
    assert!((Utc::now() - published).num_seconds().abs() < 10);

    std::fs::remove_file(&output_path).unwrap();
}

#[tokio::test]
async fn declared_success_with_missing_file_fails_the_episode() {
    let media = ExtractedMedia {
        external_id: "vid1".to_string(),
        title: "T".to_string(),
        description: String::new(),
        duration_seconds: 1,
        output_path: "/nonexistent/path/audio.m4a".to_string(),
        published_at: None,
    };
    let h = harness(MockSourceClient::new().with_extraction(media));
    let sub = subscribe(&h).await;
    let episode = h.episodes.create(sub.id, "vid1").await.unwrap();

    let err = process_episode(&process_job("vid1", sub.id), &h.deps)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::LocalIo(_)));
    let row = h.episodes.get(episode.id).unwrap();
    assert_eq!(row.status, EpisodeStatus::Failed);
    assert!(row.title.is_none());
}

#[tokio::test]
async fn temporary_tool_failure_leaves_the_row_in_flight() {
    let h = harness(MockSourceClient::new().with_extract_error(FetchError::Tool {
        output: "HTTP Error 429: Too Many Requests".to_string(),
    }));
    let sub = subscribe(&h).await;
    let episode = h.episodes.create(sub.id, "vid1").await.unwrap();

    let err = process_episode(&process_job("vid1", sub.id), &h.deps)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::TemporaryUpstream { .. }));
    assert_eq!(err.kind(), ErrorKind::Retryable);

    // Not terminal: the queue redelivers the job with backoff.
    let row = h.episodes.get(episode.id).unwrap();
    assert_eq!(row.status, EpisodeStatus::Processing);
    assert!(!row.status.is_terminal());
}

#[tokio::test]
async fn permanent_tool_failure_fails_the_episode() {
    let h = harness(MockSourceClient::new().with_extract_error(FetchError::Tool {
        output: "ERROR: Private video".to_string(),
    }));
    let sub = subscribe(&h).await;
    let episode = h.episodes.create(sub.id, "vid1").await.unwrap();

    let err = process_episode(&process_job("vid1", sub.id), &h.deps)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::PermanentUpstream { .. }));
    assert_eq!(err.kind(), ErrorKind::NonRetryable);

    let row = h.episodes.get(episode.id).unwrap();
    assert_eq!(row.status, EpisodeStatus::Failed);
}

#[tokio::test]
async fn unknown_tool_failure_fails_the_episode() {
    let h = harness(MockSourceClient::new().with_extract_error(FetchError::Tool {
        output: "some brand new breakage nobody has seen".to_string(),
    }));
    let sub = subscribe(&h).await;
    let episode = h.episodes.create(sub.id, "vid1").await.unwrap();

    let err = process_episode(&process_job("vid1", sub.id), &h.deps)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UnknownUpstream { .. }));
    let row = h.episodes.get(episode.id).unwrap();
    assert_eq!(row.status, EpisodeStatus::Failed);
}

#[tokio::test]
async fn payload_for_unknown_row_is_a_validation_error() {
    let h = harness(MockSourceClient::new());

    let err = process_episode(&process_job("no-such-item", 1), &h.deps)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(err.kind(), ErrorKind::NonRetryable);
}

// ============================================================================
// Sweeps
// ============================================================================

#[tokio::test]
async fn poll_all_enqueues_one_expedited_check_per_subscription() {
    let h = harness(MockSourceClient::new());
    for i in 0..3 {
        h.subscriptions
            .create(1, &format!("chan{i}"), "Chan")
            .await
            .unwrap();
    }

    let enqueued = check_all_subscriptions(&h.deps).await.unwrap();

    assert_eq!(enqueued, 3);
    let jobs = h.queue.recorded_of_type(CheckChannelJob::JOB_TYPE);
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j.priority == JobPriority::Expedited));
}

#[tokio::test]
async fn reclaim_resets_aged_failures_once_with_staggered_jobs() {
    let h = harness(MockSourceClient::new());
    let sub = subscribe(&h).await;

    let old = Utc::now() - ChronoDuration::hours(3);
    let older = Utc::now() - ChronoDuration::hours(4);

    let aged_1 = h.episodes.create(sub.id, "aged1").await.unwrap();
    h.episodes.set_failed(aged_1.id).await.unwrap();
    h.episodes.set_updated_at(aged_1.id, old);

    let aged_2 = h.episodes.create(sub.id, "aged2").await.unwrap();
    h.episodes.set_failed(aged_2.id).await.unwrap();
    h.episodes.set_updated_at(aged_2.id, older);

    // Failed too recently; left alone this sweep.
    let fresh = h.episodes.create(sub.id, "fresh").await.unwrap();
    h.episodes.set_failed(fresh.id).await.unwrap();

    let reclaimed = reclaim_failed_episodes(&h.deps).await.unwrap();
    assert_eq!(reclaimed, 2);

    assert_eq!(
        h.episodes.get(aged_1.id).unwrap().status,
        EpisodeStatus::Pending
    );
    assert_eq!(h.episodes.get(aged_1.id).unwrap().reclaim_count, 1);
    assert_eq!(
        h.episodes.get(fresh.id).unwrap().status,
        EpisodeStatus::Failed
    );

    // Oldest first, and each subsequent job's earliest delivery is
    // staggered by 30 seconds.
    let jobs = h.queue.recorded_of_type(ProcessEpisodeJob::JOB_TYPE);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].payload["external_id"], "aged2");
    assert_eq!(jobs[1].payload["external_id"], "aged1");

    let gap = jobs[1].not_before.unwrap() - jobs[0].not_before.unwrap();
    assert!((gap.num_seconds() - 30).abs() < 5, "gap was {gap}");

    // A second pass finds nothing to reclaim.
    let again = reclaim_failed_episodes(&h.deps).await.unwrap();
    assert_eq!(again, 0);
    assert_eq!(
        h.queue.recorded_of_type(ProcessEpisodeJob::JOB_TYPE).len(),
        2
    );
}

#[tokio::test]
async fn reclaim_abandons_rows_at_the_attempt_bound() {
    let h = harness(MockSourceClient::new());
    let sub = subscribe(&h).await;

    let row = h.episodes.create(sub.id, "hopeless").await.unwrap();
    h.episodes.set_failed(row.id).await.unwrap();
    h.episodes
        .set_updated_at(row.id, Utc::now() - ChronoDuration::hours(3));
    h.episodes
        .set_reclaim_count(row.id, h.deps.pipeline.reclaim_max_attempts);

    let reclaimed = reclaim_failed_episodes(&h.deps).await.unwrap();

    assert_eq!(reclaimed, 0);
    assert_eq!(h.episodes.get(row.id).unwrap().status, EpisodeStatus::Failed);
    assert!(h.queue.recorded().is_empty());
}

#[tokio::test]
async fn reclaim_recovers_stale_processing_rows() {
    let h = harness(MockSourceClient::new());
    let sub = subscribe(&h).await;

    // Orphaned by a worker that died mid-run, past the backoff cap.
    let orphan = h.episodes.create(sub.id, "orphan").await.unwrap();
    h.episodes
        .set_status(orphan.id, EpisodeStatus::Processing)
        .await
        .unwrap();
    h.episodes
        .set_updated_at(orphan.id, Utc::now() - ChronoDuration::hours(25));

    // A recent Processing row is still in flight; left alone.
    let active = h.episodes.create(sub.id, "active").await.unwrap();
    h.episodes
        .set_status(active.id, EpisodeStatus::Processing)
        .await
        .unwrap();

    let reclaimed = reclaim_failed_episodes(&h.deps).await.unwrap();

    assert_eq!(reclaimed, 1);
    assert_eq!(
        h.episodes.get(orphan.id).unwrap().status,
        EpisodeStatus::Pending
    );
    assert_eq!(
        h.episodes.get(active.id).unwrap().status,
        EpisodeStatus::Processing
    );
}
