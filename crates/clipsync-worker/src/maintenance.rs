//! Periodic background jobs: ledger cleanup, failed-event report and remote
//! retention.
//!
//! Shutdown: [`Maintenance::shutdown`] signals the loop and waits for the job
//! that is currently running to finish.

use std::sync::Arc;
use std::time::Duration;

use clipsync_core::{AppError, Config};
use clipsync_db::EventRepository;
use clipsync_storage::ClipStorage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Clone, Debug)]
pub struct MaintenanceConfig {
    pub ledger_cleanup_interval: Duration,
    pub failed_report_interval: Duration,
    pub storage_cleanup_interval: Duration,
    /// Days to keep uploaded events in the ledger
    pub event_retention_days: u32,
    /// Days to keep clips on the remote; 0 disables remote cleanup
    pub storage_retention_days: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            ledger_cleanup_interval: Duration::from_secs(10 * 60),
            failed_report_interval: Duration::from_secs(6 * 60 * 60),
            storage_cleanup_interval: Duration::from_secs(24 * 60 * 60),
            event_retention_days: 40,
            storage_retention_days: 0,
        }
    }
}

impl MaintenanceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            event_retention_days: config.event_retention_days,
            storage_retention_days: config.google_drive.retention_days,
            ..Self::default()
        }
    }
}

pub struct Maintenance {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Maintenance {
    /// Spawn the maintenance loop. Every job first runs one interval after start.
    pub fn start(
        events: EventRepository,
        storage: Arc<dyn ClipStorage>,
        config: MaintenanceConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(events, storage, config, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Maintenance task ended abnormally");
        }
    }
}

async fn run(
    events: EventRepository,
    storage: Arc<dyn ClipStorage>,
    config: MaintenanceConfig,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::info!(
        ledger_cleanup_secs = config.ledger_cleanup_interval.as_secs(),
        failed_report_secs = config.failed_report_interval.as_secs(),
        storage_cleanup_secs = config.storage_cleanup_interval.as_secs(),
        event_retention_days = config.event_retention_days,
        storage_retention_days = config.storage_retention_days,
        "Maintenance started"
    );

    let mut ledger_tick = every(config.ledger_cleanup_interval);
    let mut report_tick = every(config.failed_report_interval);
    let mut storage_tick = every(config.storage_cleanup_interval);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Maintenance shutting down");
                break;
            }
            _ = ledger_tick.tick() => {
                if let Err(e) = cleanup_ledger(&events, config.event_retention_days).await {
                    tracing::error!(error = %e, "Ledger cleanup failed");
                }
            }
            _ = report_tick.tick() => {
                if let Err(e) = report_failed_events(&events).await {
                    tracing::error!(error = %e, "Failed-event report could not be built");
                }
            }
            _ = storage_tick.tick() => {
                if let Err(e) = cleanup_storage(storage.as_ref(), config.storage_retention_days).await {
                    tracing::error!(error = %e, backend = %storage.backend_type(), "Remote retention cleanup failed");
                }
            }
        }
    }

    tracing::info!("Maintenance stopped");
}

fn every(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Remove uploaded events past the retention window from the ledger.
pub async fn cleanup_ledger(
    events: &EventRepository,
    retention_days: u32,
) -> Result<u64, AppError> {
    let removed = events.cleanup_old_events(retention_days).await?;
    if removed > 0 {
        tracing::info!(removed, retention_days, "Removed old events from ledger");
    } else {
        tracing::debug!(retention_days, "No old events to remove from ledger");
    }
    Ok(removed)
}

/// Log the events that keep failing and return their ids.
pub async fn report_failed_events(events: &EventRepository) -> Result<Vec<String>, AppError> {
    let failed = events.select_not_uploaded_yet_hard().await?;
    if failed.is_empty() {
        tracing::debug!("No failed events found");
    } else {
        tracing::error!(
            count = failed.len(),
            event_ids = ?failed,
            "Events keep failing to upload, please check the logs for more information"
        );
    }
    Ok(failed)
}

/// Apply remote retention; a retention of 0 keeps everything.
pub async fn cleanup_storage(storage: &dyn ClipStorage, retention_days: u32) -> Result<u64, AppError> {
    if retention_days == 0 {
        tracing::debug!("Remote retention disabled, skipping cleanup");
        return Ok(0);
    }

    storage
        .cleanup_expired(retention_days)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeStorage;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_events() -> EventRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let events = EventRepository::new(pool);
        events.run_migrations().await.unwrap();
        events
    }

    async fn age_event(events: &EventRepository, event_id: &str, modifier: &str) {
        sqlx::query("UPDATE events SET created = datetime('now', ?) WHERE event_id = ?")
            .bind(modifier)
            .bind(event_id)
            .execute(events.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_ledger_uses_retention() {
        let events = test_events().await;
        events.insert_event("old", 1.0).await.unwrap();
        events.update_event("old", true, None).await.unwrap();
        age_event(&events, "old", "-41 days").await;

        assert_eq!(cleanup_ledger(&events, 60).await.unwrap(), 0);
        assert_eq!(cleanup_ledger(&events, 40).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_report_lists_hard_failures() {
        let events = test_events().await;
        events.insert_event("stuck", 1.0).await.unwrap();
        for _ in 0..6 {
            events.update_event("stuck", false, None).await.unwrap();
        }
        age_event(&events, "stuck", "-1 hour").await;
        events.insert_event("fine", 2.0).await.unwrap();

        assert_eq!(report_failed_events(&events).await.unwrap(), vec!["stuck"]);
    }

    #[tokio::test]
    async fn test_storage_cleanup_disabled_by_zero_retention() {
        let storage = FakeStorage::new();
        assert_eq!(cleanup_storage(&storage, 0).await.unwrap(), 0);
        // Backends without retention support keep everything
        assert_eq!(cleanup_storage(&storage, 30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let events = test_events().await;
        let maintenance = Maintenance::start(
            events,
            Arc::new(FakeStorage::new()),
            MaintenanceConfig::default(),
        );

        tokio::time::timeout(Duration::from_secs(5), maintenance.shutdown())
            .await
            .unwrap();
    }
}
