use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's subscription to one external channel.
///
/// `(user_id, channel_id)` is unique. Deleting a subscription removes its
/// episodes by cascade; nothing else ever mutates a row except the title.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    /// Source-assigned channel identifier.
    pub channel_id: String,
    pub title: String,
    /// Stable identifier for the subscription's public feed.
    pub feed_uuid: Uuid,
    pub created_at: DateTime<Utc>,
}
