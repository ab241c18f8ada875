//! In-memory stores for tests and local development.
//!
//! A single lock around each table makes check-and-insert atomic, so the
//! unique constraints hold under concurrent callers just as they do in
//! Postgres.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::traits::{EpisodeStore, StoreError, StoreResult, SubscriptionStore};
use crate::domains::episode::{CompletedEpisode, Episode, EpisodeStatus};
use crate::domains::subscription::Subscription;

fn age_cutoff(age: Duration) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(age.as_secs() as i64)
}

#[derive(Default)]
struct EpisodeTable {
    rows: Vec<Episode>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryEpisodeStore {
    inner: Mutex<EpisodeTable>,
}

impl MemoryEpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for assertions.
    pub fn all(&self) -> Vec<Episode> {
        self.inner.lock().unwrap().rows.clone()
    }

    pub fn get(&self, id: i64) -> Option<Episode> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Backdate a row's `updated_at`, for aging-window tests.
    pub fn set_updated_at(&self, id: i64, updated_at: DateTime<Utc>) {
        let mut table = self.inner.lock().unwrap();
        if let Some(row) = table.rows.iter_mut().find(|e| e.id == id) {
            row.updated_at = updated_at;
        }
    }

    /// Force a row's reclaim counter, for abandonment tests.
    pub fn set_reclaim_count(&self, id: i64, reclaim_count: i32) {
        let mut table = self.inner.lock().unwrap();
        if let Some(row) = table.rows.iter_mut().find(|e| e.id == id) {
            row.reclaim_count = reclaim_count;
        }
    }
}

#[async_trait]
impl EpisodeStore for MemoryEpisodeStore {
    async fn create(&self, subscription_id: i64, external_id: &str) -> StoreResult<Episode> {
        let mut table = self.inner.lock().unwrap();
        if table.rows.iter().any(|e| e.external_id == external_id) {
            return Err(StoreError::Duplicate);
        }
        table.next_id += 1;
        let now = Utc::now();
        let episode = Episode {
            id: table.next_id,
            subscription_id,
            external_id: external_id.to_string(),
            status: EpisodeStatus::Pending,
            title: None,
            description: None,
            duration_seconds: None,
            published_at: None,
            audio_uuid: Uuid::new_v4(),
            audio_path: None,
            audio_size_bytes: None,
            reclaim_count: 0,
            created_at: now,
            updated_at: now,
        };
        table.rows.push(episode.clone());
        Ok(episode)
    }

    async fn get_by_external_id(&self, external_id: &str) -> StoreResult<Episode> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|e| e.external_id == external_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn set_status(&self, id: i64, status: EpisodeStatus) -> StoreResult<()> {
        let mut table = self.inner.lock().unwrap();
        let row = table
            .rows
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound)?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_completed(&self, id: i64, completed: CompletedEpisode) -> StoreResult<()> {
        let mut table = self.inner.lock().unwrap();
        let row = table
            .rows
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound)?;
        row.status = EpisodeStatus::Completed;
        row.title = Some(completed.title);
        row.description = Some(completed.description);
        row.duration_seconds = Some(completed.duration_seconds);
        row.audio_path = Some(completed.audio_path);
        row.audio_size_bytes = Some(completed.audio_size_bytes);
        row.published_at = Some(completed.published_at);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_failed(&self, id: i64) -> StoreResult<()> {
        self.set_status(id, EpisodeStatus::Failed).await
    }

    async fn list_failed_older_than(
        &self,
        age: Duration,
        limit: usize,
    ) -> StoreResult<Vec<Episode>> {
        let cutoff = age_cutoff(age);
        let mut rows: Vec<Episode> = self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|e| e.status == EpisodeStatus::Failed && e.updated_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.updated_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_stale_processing(
        &self,
        age: Duration,
        limit: usize,
    ) -> StoreResult<Vec<Episode>> {
        let cutoff = age_cutoff(age);
        let mut rows: Vec<Episode> = self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|e| e.status == EpisodeStatus::Processing && e.updated_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.updated_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn reset_for_reclaim(&self, id: i64) -> StoreResult<()> {
        let mut table = self.inner.lock().unwrap();
        let row = table
            .rows
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound)?;
        row.status = EpisodeStatus::Pending;
        row.reclaim_count += 1;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn count_for_subscription(&self, subscription_id: i64) -> StoreResult<i64> {
        let count = self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|e| e.subscription_id == subscription_id)
            .count();
        Ok(count as i64)
    }
}

#[derive(Default)]
struct SubscriptionTable {
    rows: Vec<Subscription>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    inner: Mutex<SubscriptionTable>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create(
        &self,
        user_id: i64,
        channel_id: &str,
        title: &str,
    ) -> StoreResult<Subscription> {
        let mut table = self.inner.lock().unwrap();
        if table
            .rows
            .iter()
            .any(|s| s.user_id == user_id && s.channel_id == channel_id)
        {
            return Err(StoreError::Duplicate);
        }
        table.next_id += 1;
        let subscription = Subscription {
            id: table.next_id,
            user_id,
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            feed_uuid: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        table.rows.push(subscription.clone());
        Ok(subscription)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Subscription> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self.inner.lock().unwrap().rows.clone())
    }

    async fn delete(&self, user_id: i64, id: i64) -> StoreResult<()> {
        let mut table = self.inner.lock().unwrap();
        table.rows.retain(|s| !(s.id == id && s.user_id == user_id));
        Ok(())
    }
}
