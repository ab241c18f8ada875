//! The pluggable source-client trait.

use std::path::Path;

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::types::{ChannelItem, ExtractedMedia};

/// Pluggable client for the external content source.
///
/// Implementations fetch channel listings and extract individual items:
/// - [`crate::YtDlpClient`] - spawns the `yt-dlp` binary
/// - [`crate::MockSourceClient`] - queued responses for tests
///
/// The pipeline only depends on this trait, so tests inject a mock instead
/// of spawning subprocesses.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// List the channel's most recent items, newest first.
    async fn list_recent(&self, channel_id: &str, limit: usize) -> FetchResult<Vec<ChannelItem>>;

    /// Download and transcode one item, writing the audio to `output_path`.
    async fn extract(&self, external_id: &str, output_path: &Path) -> FetchResult<ExtractedMedia>;

    /// Client name for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}
