use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state for one discovered item.
///
/// Pending is the initial state. Processing is entered only at the start of
/// a processor run. Completed and Failed are terminal, but Failed rows (and
/// Processing rows orphaned by a dead worker) can be pulled back to Pending
/// by the reclaim sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "episode_status", rename_all = "lowercase")]
pub enum EpisodeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EpisodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EpisodeStatus::Completed | EpisodeStatus::Failed)
    }

    /// Whether the reclaim sweep may reset a row in this state.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, EpisodeStatus::Failed | EpisodeStatus::Processing)
    }
}

/// One unit of content discovered under a subscription.
///
/// `external_id` is the dedupe key: the store's unique constraint guarantees
/// at most one row per external id ever exists. Metadata fields are only
/// populated once the row reaches Completed; a Failed row keeps them null.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Episode {
    pub id: i64,
    pub subscription_id: i64,
    pub external_id: String,
    pub status: EpisodeStatus,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
    /// Assigned at insert; names the audio artifact on disk.
    pub audio_uuid: Uuid,
    pub audio_path: Option<String>,
    pub audio_size_bytes: Option<i64>,
    /// How many times the reclaim sweep has reset this row.
    pub reclaim_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// File name of the audio artifact for this episode.
    pub fn audio_filename(&self) -> String {
        format!("{}.m4a", self.audio_uuid)
    }
}

/// Metadata written when an extraction run succeeds.
#[derive(Debug, Clone)]
pub struct CompletedEpisode {
    pub title: String,
    pub description: String,
    pub duration_seconds: i32,
    pub audio_path: String,
    pub audio_size_bytes: i64,
    pub published_at: DateTime<Utc>,
}
