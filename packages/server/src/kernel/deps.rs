//! Worker dependencies (using traits for testability)
//!
//! This module provides the central dependency container handed to every job
//! handler. All external collaborators sit behind trait objects so tests can
//! swap in the in-memory stores, the mock source client, and the recording
//! queue.

use std::path::PathBuf;
use std::sync::Arc;

use ytdlp_client::SourceClient;

use crate::config::PipelineConfig;
use crate::kernel::jobs::JobQueue;
use crate::stores::{EpisodeStore, SubscriptionStore};

/// Dependencies accessible to job handlers.
#[derive(Clone)]
pub struct WorkerDeps {
    pub episodes: Arc<dyn EpisodeStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Client for the external content source.
    pub source: Arc<dyn SourceClient>,
    /// Queue the pipeline enqueues follow-up work into.
    pub queue: Arc<dyn JobQueue>,
    /// Directory audio artifacts are written into.
    pub audio_dir: PathBuf,
    pub pipeline: PipelineConfig,
}
