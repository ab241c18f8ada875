//! PostgreSQL-backed store implementations.
//!
//! All pipeline SQL lives here; the models stay plain rows.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::traits::{EpisodeStore, StoreError, StoreResult, SubscriptionStore};
use crate::domains::episode::{CompletedEpisode, Episode, EpisodeStatus};
use crate::domains::subscription::Subscription;

fn map_insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Database(e),
    }
}

fn age_cutoff(age: Duration) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(age.as_secs() as i64)
}

pub struct PostgresEpisodeStore {
    pool: PgPool,
}

impl PostgresEpisodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EpisodeStore for PostgresEpisodeStore {
    async fn create(&self, subscription_id: i64, external_id: &str) -> StoreResult<Episode> {
        sqlx::query_as::<_, Episode>(
            r#"
            INSERT INTO episodes (subscription_id, external_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)
    }

    async fn get_by_external_id(&self, external_id: &str) -> StoreResult<Episode> {
        sqlx::query_as::<_, Episode>("SELECT * FROM episodes WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn set_status(&self, id: i64, status: EpisodeStatus) -> StoreResult<()> {
        sqlx::query("UPDATE episodes SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_completed(&self, id: i64, completed: CompletedEpisode) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE episodes
            SET status = 'completed',
                title = $2,
                description = $3,
                duration_seconds = $4,
                audio_path = $5,
                audio_size_bytes = $6,
                published_at = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&completed.title)
        .bind(&completed.description)
        .bind(completed.duration_seconds)
        .bind(&completed.audio_path)
        .bind(completed.audio_size_bytes)
        .bind(completed.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_failed(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE episodes SET status = 'failed', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_failed_older_than(
        &self,
        age: Duration,
        limit: usize,
    ) -> StoreResult<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(
            r#"
            SELECT * FROM episodes
            WHERE status = 'failed' AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(age_cutoff(age))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_stale_processing(
        &self,
        age: Duration,
        limit: usize,
    ) -> StoreResult<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(
            r#"
            SELECT * FROM episodes
            WHERE status = 'processing' AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(age_cutoff(age))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn reset_for_reclaim(&self, id: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE episodes
            SET status = 'pending',
                reclaim_count = reclaim_count + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_for_subscription(&self, subscription_id: i64) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM episodes WHERE subscription_id = $1",
        )
        .bind(subscription_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn create(
        &self,
        user_id: i64,
        channel_id: &str,
        title: &str,
    ) -> StoreResult<Subscription> {
        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (user_id, channel_id, title)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(channel_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Subscription> {
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> StoreResult<Vec<Subscription>> {
        let rows =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn delete(&self, user_id: i64, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
