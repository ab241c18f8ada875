use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Directory audio artifacts are written into.
    pub audio_dir: String,
    pub ytdlp_binary: String,
    /// Base64-encoded cookie jar handed to the extraction tool, if any.
    pub cookies_base64: Option<String>,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            audio_dir: env::var("AUDIO_DIR").unwrap_or_else(|_| "audio".to_string()),
            ytdlp_binary: env::var("YTDLP_BINARY").unwrap_or_else(|_| "yt-dlp".to_string()),
            cookies_base64: env::var("YOUTUBE_COOKIES_BASE64").ok(),
            pipeline: PipelineConfig::from_env(),
        })
    }
}

/// Tunables for the ingestion pipeline. Every knob has a deployed default
/// and an environment override.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Items fetched per channel poll.
    pub poll_fetch_limit: usize,
    /// Cap on items accepted during a brand-new channel's first poll.
    pub backfill_cap: usize,
    /// How far behind the newest fetched item a backfill may reach.
    pub backfill_window: Duration,
    /// Source-recency index below which new items are enqueued expedited.
    pub expedite_newest: usize,
    /// Courtesy pause before each request against the external source.
    pub gentle_delay: Duration,
    /// Deadline for one channel listing run.
    pub list_timeout: Duration,
    /// Deadline for one extraction run.
    pub extract_timeout: Duration,
    /// Exponential backoff base for queue-driven retries.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Failed rows younger than this are left alone by the reclaim sweep.
    pub reclaim_min_age: Duration,
    /// Rows reclaimed per sweep.
    pub reclaim_batch: usize,
    /// Stagger between re-enqueued reclaim jobs.
    pub reclaim_stagger: Duration,
    /// A row is abandoned once it has been reclaimed this many times.
    pub reclaim_max_attempts: i32,
    /// Processing rows older than this are treated as orphaned by a dead
    /// worker. Kept past the backoff cap so no queue-driven retry can still
    /// be in flight.
    pub stale_processing_age: Duration,
    /// Cron expression for the poll-all sweep.
    pub poll_all_cron: String,
    /// Cron expression for the reclaim sweep.
    pub reclaim_cron: String,
    /// Jobs one worker claims and executes at a time.
    pub worker_concurrency: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_fetch_limit: 20,
            backfill_cap: 50,
            backfill_window: Duration::from_secs(365 * 24 * 60 * 60),
            expedite_newest: 10,
            gentle_delay: Duration::from_secs(30),
            list_timeout: Duration::from_secs(2 * 60),
            extract_timeout: Duration::from_secs(15 * 60),
            backoff_base: Duration::from_secs(5 * 60),
            backoff_cap: Duration::from_secs(24 * 60 * 60),
            reclaim_min_age: Duration::from_secs(60 * 60),
            reclaim_batch: 50,
            reclaim_stagger: Duration::from_secs(30),
            reclaim_max_attempts: 5,
            stale_processing_age: Duration::from_secs(24 * 60 * 60),
            poll_all_cron: "0 0 * * * *".to_string(),
            reclaim_cron: "0 0 */6 * * *".to_string(),
            worker_concurrency: 1,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with any environment overrides. An unparsable
    /// value falls back to the default rather than failing startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u64("YOUTUBE_REQUEST_DELAY_SECONDS") {
            cfg.gentle_delay = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("RETRY_BASE_DELAY_MINUTES") {
            cfg.backoff_base = Duration::from_secs(v * 60);
        }
        if let Some(v) = env_u64("RETRY_MAX_DELAY_HOURS") {
            cfg.backoff_cap = Duration::from_secs(v * 60 * 60);
        }
        if let Some(v) = env_u64("CHECK_CHANNEL_TIMEOUT_MINUTES") {
            cfg.list_timeout = Duration::from_secs(v * 60);
        }
        if let Some(v) = env_u64("PROCESS_VIDEO_TIMEOUT_MINUTES") {
            cfg.extract_timeout = Duration::from_secs(v * 60);
        }
        if let Some(v) = env_u64("RECLAIM_MIN_AGE_MINUTES") {
            cfg.reclaim_min_age = Duration::from_secs(v * 60);
        }
        if let Some(v) = env_u64("RECLAIM_BATCH_SIZE") {
            cfg.reclaim_batch = v as usize;
        }
        if let Some(v) = env_u64("RECLAIM_STAGGER_SECONDS") {
            cfg.reclaim_stagger = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("RECLAIM_MAX_ATTEMPTS") {
            cfg.reclaim_max_attempts = v as i32;
        }
        if let Some(v) = env_u64("STALE_PROCESSING_HOURS") {
            cfg.stale_processing_age = Duration::from_secs(v * 60 * 60);
        }
        if let Some(v) = env_u64("WORKER_CONCURRENCY") {
            cfg.worker_concurrency = v as i64;
        }
        if let Ok(v) = env::var("POLL_ALL_CRON") {
            cfg.poll_all_cron = v;
        }
        if let Ok(v) = env::var("RECLAIM_CRON") {
            cfg.reclaim_cron = v;
        }

        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
