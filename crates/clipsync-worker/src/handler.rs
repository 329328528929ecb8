//! Per-event policy around the upload orchestrator: ledger bookkeeping,
//! skip rules and the attempt counter.

use std::sync::Arc;
use std::time::Duration;

use clipsync_core::{AppError, Config, EventError};
use clipsync_db::EventRepository;
use clipsync_storage::ClipStorage;
use serde_json::Value;

use crate::uploader::ClipUploader;

/// What `EventHandler::handle_event` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Uploaded,
    UploadFailed,
    /// The event has not ended yet or has no clip
    Incomplete,
    NonRetriable,
    AlreadyUploaded,
}

pub struct EventHandler {
    uploader: ClipUploader,
    events: EventRepository,
    frigate_url: String,
    settle_delay: Duration,
    notify_after_tries: i64,
}

impl EventHandler {
    pub fn new(
        uploader: ClipUploader,
        events: EventRepository,
        frigate_url: impl Into<String>,
        config: &Config,
    ) -> Self {
        Self {
            uploader,
            events,
            frigate_url: frigate_url.into(),
            settle_delay: config.clip_settle_delay(),
            notify_after_tries: config.notify_after_tries,
        }
    }

    /// Wire an uploader backed by `events` against the configured Frigate.
    ///
    /// Fails with `AppError::Config` when `FRIGATE_URL` is not set.
    pub fn from_config(
        events: EventRepository,
        storage: Arc<dyn ClipStorage>,
        config: &Config,
    ) -> Result<Self, AppError> {
        let frigate_url = config
            .frigate_url
            .clone()
            .ok_or_else(|| AppError::Config("FRIGATE_URL is not set".to_string()))?;
        let uploader = ClipUploader::new(storage, Arc::new(events.clone()), config)?;
        Ok(Self::new(uploader, events, frigate_url, config))
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Process one Frigate event record (the `after` object of an event message,
    /// or one entry of the events API).
    #[tracing::instrument(skip(self, event), fields(event_id = tracing::field::Empty))]
    pub async fn handle_event(&self, event: &Value) -> Result<HandleOutcome, AppError> {
        let event_id = match event.get("id") {
            Some(Value::String(id)) => id.as_str(),
            Some(Value::Null) | None => return Err(EventError::MissingField("id").into()),
            Some(other) => {
                return Err(EventError::InvalidField {
                    field: "id",
                    reason: format!("expected a string, got {}", other),
                }
                .into())
            }
        };
        tracing::Span::current().record("event_id", event_id);

        let start_time = match event.get("start_time") {
            Some(Value::Null) | None => return Err(EventError::MissingField("start_time").into()),
            Some(value) => value.as_f64().ok_or_else(|| EventError::InvalidField {
                field: "start_time",
                reason: format!("expected a numeric Unix timestamp, got {}", value),
            })?,
        };

        if !self.events.is_event_exists(event_id).await? {
            self.events.insert_event(event_id, start_time).await?;
        }

        let has_ended = event.get("end_time").is_some_and(|end| !end.is_null());
        let has_clip = event.get("has_clip").and_then(Value::as_bool) == Some(true);
        if !has_ended || !has_clip {
            tracing::debug!("Event has not ended or has no clip yet, skipping");
            return Ok(HandleOutcome::Incomplete);
        }

        if self.events.select_retry(event_id).await? == Some(false) {
            tracing::debug!("Event is marked as non-retriable, skipping upload");
            return Ok(HandleOutcome::NonRetriable);
        }

        if self.events.select_event_uploaded(event_id).await? == Some(true) {
            tracing::debug!("Event already uploaded, skipping");
            return Ok(HandleOutcome::AlreadyUploaded);
        }

        if !self.settle_delay.is_zero() {
            tracing::debug!(
                delay_secs = self.settle_delay.as_secs(),
                "Waiting for Frigate to finalize the clip"
            );
            tokio::time::sleep(self.settle_delay).await;
        }

        if self.uploader.upload(event, &self.frigate_url).await {
            tracing::info!("Video successfully uploaded");
            self.events.update_event(event_id, true, None).await?;
            return Ok(HandleOutcome::Uploaded);
        }

        self.events.update_event(event_id, false, None).await?;
        let tries = self.events.select_tries(event_id).await?.unwrap_or(0);
        // Transient failures are common; only escalate repeated ones.
        if tries >= self.notify_after_tries {
            tracing::error!(tries, "Failed to upload video");
        } else {
            tracing::debug!(tries, "Upload attempt failed, will retry later");
        }

        Ok(HandleOutcome::UploadFailed)
    }
}
