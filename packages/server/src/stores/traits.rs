//! Store contracts for the pipeline's shared state.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domains::episode::{CompletedEpisode, Episode, EpisodeStatus};
use crate::domains::subscription::Subscription;

/// Errors surfaced by the stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row for the given key.
    #[error("record not found")]
    NotFound,

    /// A unique constraint rejected the insert; the row already exists.
    #[error("record already exists")]
    Duplicate,

    /// Anything the underlying database reported.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// CRUD over episode rows, keyed by external id for dedupe.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// Insert a new Pending episode. The store enforces the external-id
    /// unique constraint atomically and returns [`StoreError::Duplicate`]
    /// when the row already exists, so dedupe stays correct under
    /// concurrent pollers.
    async fn create(&self, subscription_id: i64, external_id: &str) -> StoreResult<Episode>;

    async fn get_by_external_id(&self, external_id: &str) -> StoreResult<Episode>;

    async fn set_status(&self, id: i64, status: EpisodeStatus) -> StoreResult<()>;

    /// Record a successful extraction and move the row to Completed.
    async fn set_completed(&self, id: i64, completed: CompletedEpisode) -> StoreResult<()>;

    async fn set_failed(&self, id: i64) -> StoreResult<()>;

    /// Failed rows whose last update is older than `age`, oldest first.
    async fn list_failed_older_than(&self, age: Duration, limit: usize)
        -> StoreResult<Vec<Episode>>;

    /// Processing rows whose last update is older than `age`, oldest first.
    /// These were orphaned by a worker that died mid-run.
    async fn list_stale_processing(&self, age: Duration, limit: usize)
        -> StoreResult<Vec<Episode>>;

    /// Reset a reclaimed row to Pending and bump its reclaim counter.
    async fn reset_for_reclaim(&self, id: i64) -> StoreResult<()>;

    async fn count_for_subscription(&self, subscription_id: i64) -> StoreResult<i64>;
}

/// CRUD over subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a subscription. `(user_id, channel_id)` is unique.
    async fn create(&self, user_id: i64, channel_id: &str, title: &str)
        -> StoreResult<Subscription>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Subscription>;

    async fn list_all(&self) -> StoreResult<Vec<Subscription>>;

    /// Delete a user's subscription; its episodes go with it by cascade.
    async fn delete(&self, user_id: i64, id: i64) -> StoreResult<()>;
}
