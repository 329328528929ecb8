//! Event ledger repository: one row per Frigate event, tracking whether its
//! clip was uploaded, how many attempts were made and whether to keep trying.

use async_trait::async_trait;
use clipsync_core::{AppError, RetryStore};
use sqlx::SqlitePool;

/// Events younger than this are still being handled by the live path
const PENDING_GRACE: &str = "-5 minutes";

/// Attempt count separating "still pending" from "failing hard"
const SOFT_TRY_LIMIT: i64 = 5;

#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn is_event_exists(&self, event_id: &str) -> Result<bool, AppError> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT event_id FROM events WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Record a newly seen event. Returns `false` if it was already known.
    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn insert_event(&self, event_id: &str, start_time: f64) -> Result<bool, AppError> {
        let result = sqlx::query("INSERT OR IGNORE INTO events (event_id, start_time) VALUES (?, ?)")
            .bind(event_id)
            .bind(start_time)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the outcome of one upload attempt and count it.
    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn update_event(
        &self,
        event_id: &str,
        uploaded: bool,
        retry: Option<bool>,
    ) -> Result<(), AppError> {
        match retry {
            Some(retry) => {
                sqlx::query(
                    "UPDATE events SET uploaded = ?, retry = ?, tries = tries + 1 WHERE event_id = ?",
                )
                .bind(uploaded)
                .bind(retry)
                .bind(event_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("UPDATE events SET uploaded = ?, tries = tries + 1 WHERE event_id = ?")
                    .bind(uploaded)
                    .bind(event_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn select_retry(&self, event_id: &str) -> Result<Option<bool>, AppError> {
        let retry: Option<Option<bool>> =
            sqlx::query_scalar("SELECT retry FROM events WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(retry.flatten())
    }

    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn update_event_retry(&self, event_id: &str, retry: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE events SET retry = ? WHERE event_id = ?")
            .bind(retry)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn select_tries(&self, event_id: &str) -> Result<Option<i64>, AppError> {
        let tries: Option<Option<i64>> =
            sqlx::query_scalar("SELECT tries FROM events WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tries.flatten())
    }

    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn select_event_uploaded(&self, event_id: &str) -> Result<Option<bool>, AppError> {
        let uploaded: Option<Option<bool>> =
            sqlx::query_scalar("SELECT uploaded FROM events WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        if uploaded.is_none() {
            tracing::debug!(event_id = %event_id, "Event not found in database");
        }
        Ok(uploaded.flatten())
    }

    /// Events still waiting for their clip: not uploaded, older than the
    /// grace period and with few enough attempts.
    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn select_not_uploaded_yet(&self) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar(
            "SELECT event_id FROM events \
             WHERE uploaded = 0 AND created <= datetime('now', ?) AND tries <= ? \
             ORDER BY created",
        )
        .bind(PENDING_GRACE)
        .bind(SOFT_TRY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Events that keep failing; used for reporting.
    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn select_not_uploaded_yet_hard(&self) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar(
            "SELECT event_id FROM events \
             WHERE uploaded = 0 AND created <= datetime('now', ?) AND tries >= ? \
             ORDER BY created",
        )
        .bind(PENDING_GRACE)
        .bind(SOFT_TRY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Start time of the most recent event, or 0 when the ledger is empty.
    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn get_latest_event_start_time(&self) -> Result<f64, AppError> {
        let latest: Option<f64> = sqlx::query_scalar("SELECT MAX(start_time) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(latest.unwrap_or(0.0))
    }

    /// Drop uploaded events older than `retention_days`. Returns the number removed.
    #[tracing::instrument(skip(self), fields(db.table = "events"))]
    pub async fn cleanup_old_events(&self, retention_days: u32) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM events WHERE created <= datetime('now', ?) AND uploaded = 1",
        )
        .bind(format!("-{} days", retention_days))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RetryStore for EventRepository {
    async fn select_tries(&self, event_id: &str) -> Result<Option<i64>, AppError> {
        EventRepository::select_tries(self, event_id).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        uploaded: bool,
        retry: Option<bool>,
    ) -> Result<(), AppError> {
        EventRepository::update_event(self, event_id, uploaded, retry).await
    }
}
