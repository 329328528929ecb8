//! Newline-delimited event feed.
//!
//! Each line is a Frigate event record, or a `frigate/events` MQTT message
//! whose `after` record is handled. Pipe a subscriber into the daemon, e.g.
//! `mosquitto_sub -t frigate/events | clipsync`.

use std::io::BufRead;

use clipsync_core::AppError;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::handler::{EventHandler, HandleOutcome};

const LINE_BUFFER: usize = 64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub handled: usize,
    pub uploaded: usize,
    /// Lines that can never be handled (bad JSON, missing fields)
    pub rejected: usize,
    /// Events that hit a ledger or internal error
    pub failed: usize,
}

/// Read stdin on a dedicated thread so a blocked read never holds up
/// runtime shutdown.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read event from stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Handle events one at a time until the line source closes.
pub async fn run_event_feed(handler: &EventHandler, mut lines: mpsc::Receiver<String>) -> FeedStats {
    let mut stats = FeedStats::default();

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match handle_line(handler, line).await {
            Ok(outcome) => {
                stats.handled += 1;
                if outcome == HandleOutcome::Uploaded {
                    stats.uploaded += 1;
                }
            }
            Err(e) if !e.is_recoverable() => {
                stats.rejected += 1;
                tracing::warn!(error = %e, "Skipping unusable event");
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(error = %e.detailed_message(), "Event handling failed");
            }
        }
    }

    tracing::info!(
        handled = stats.handled,
        uploaded = stats.uploaded,
        rejected = stats.rejected,
        failed = stats.failed,
        "Event feed closed"
    );
    stats
}

async fn handle_line(handler: &EventHandler, line: &str) -> Result<HandleOutcome, AppError> {
    let message: Value = serde_json::from_str(line)?;
    let event = message.get("after").unwrap_or(&message);
    handler.handle_event(event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeStorage;
    use crate::uploader::ClipUploader;
    use clipsync_core::Config;
    use clipsync_db::EventRepository;
    use mockito::Server;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn handler(frigate_url: String) -> (EventHandler, EventRepository, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let events = EventRepository::new(pool);
        events.run_migrations().await.unwrap();

        let config = Config::from_vars(|key| (key == "TIMEZONE").then(|| "UTC".to_string())).unwrap();
        let spool = tempfile::tempdir().unwrap();
        let uploader = ClipUploader::with_client(
            Arc::new(FakeStorage::new()),
            Arc::new(events.clone()),
            reqwest::Client::new(),
            config.timezone,
            spool.path().to_path_buf(),
        );
        let handler = EventHandler::new(uploader, events.clone(), frigate_url, &config)
            .with_settle_delay(Duration::ZERO);
        (handler, events, spool)
    }

    async fn feed(lines: Vec<String>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.send(line).await.unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_feed_handles_records_and_mqtt_messages() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/events/e1/clip.mp4")
            .with_status(200)
            .with_body("mp4")
            .create_async()
            .await;
        let (handler, events, _spool) = handler(server.url()).await;

        let ended = json!({
            "type": "end",
            "before": {"id": "e1", "camera": "yard", "start_time": 1700000000.0},
            "after": {
                "id": "e1",
                "camera": "yard",
                "start_time": 1700000000.0,
                "end_time": 1700000020.0,
                "has_clip": true,
            },
        });
        let ongoing = json!({"id": "e2", "camera": "yard", "start_time": 1700000100.0, "end_time": null});
        let lines = vec![
            ended.to_string(),
            String::new(),
            ongoing.to_string(),
            "{not json".to_string(),
            json!({"start_time": 1.0}).to_string(),
        ];

        let stats = run_event_feed(&handler, feed(lines).await).await;

        assert_eq!(
            stats,
            FeedStats {
                handled: 2,
                uploaded: 1,
                rejected: 2,
                failed: 0,
            }
        );
        assert_eq!(events.select_event_uploaded("e1").await.unwrap(), Some(true));
        assert!(events.is_event_exists("e2").await.unwrap());
    }

    #[tokio::test]
    async fn test_ledger_errors_are_counted_as_failures() {
        let (handler, events, _spool) = handler("http://127.0.0.1:1".to_string()).await;
        events.pool().close().await;

        let lines = vec![json!({"id": "e1", "start_time": 1.0}).to_string()];
        let stats = run_event_feed(&handler, feed(lines).await).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.handled, 0);
    }
}
