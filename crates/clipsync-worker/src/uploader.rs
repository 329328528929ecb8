//! Upload orchestrator: derive the destination, stream the clip from Frigate
//! into a spool file and hand it to the storage backend.
//!
//! Every attempt ends in a plain `bool`. Failures are logged here (or by the
//! backend) with the event id, URL and status needed to diagnose them later;
//! nothing is propagated to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use clipsync_core::{AppError, Config, EventDescriptor, RetryStore};
use clipsync_storage::{build_http_client, ClipBuffer, ClipStorage, FolderHandle};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::frigate::generate_video_url;

/// Message Frigate returns with a 500 while the clip is still being assembled
pub const CLIP_NOT_READY_MESSAGE: &str = "Could not create clip from recordings";

const DEFAULT_MAX_CLIP_TRIES: i64 = 10;

/// Upper bound on how much of an error response is read for classification
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("{source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Spool file error: {0}")]
    Spool(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl UploadError {
    fn download(url: &str) -> impl FnOnce(reqwest::Error) -> Self + '_ {
        move |source| UploadError::Download {
            url: url.to_string(),
            source,
        }
    }
}

pub struct ClipUploader {
    storage: Arc<dyn ClipStorage>,
    retry_store: Arc<dyn RetryStore>,
    http: Client,
    timezone: Tz,
    spool_dir: PathBuf,
    max_clip_tries: i64,
}

impl ClipUploader {
    /// Build an uploader whose download client uses the configured per-read timeout.
    pub fn new(
        storage: Arc<dyn ClipStorage>,
        retry_store: Arc<dyn RetryStore>,
        config: &Config,
    ) -> Result<Self, AppError> {
        let http = build_http_client(config)
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(
            storage,
            retry_store,
            http,
            config.timezone,
            config.spool_dir(),
        )
        .with_max_clip_tries(config.max_clip_tries))
    }

    pub fn with_client(
        storage: Arc<dyn ClipStorage>,
        retry_store: Arc<dyn RetryStore>,
        http: Client,
        timezone: Tz,
        spool_dir: PathBuf,
    ) -> Self {
        Self {
            storage,
            retry_store,
            http,
            timezone,
            spool_dir,
            max_clip_tries: DEFAULT_MAX_CLIP_TRIES,
        }
    }

    pub fn with_max_clip_tries(mut self, max_clip_tries: i64) -> Self {
        self.max_clip_tries = max_clip_tries;
        self
    }

    pub fn storage(&self) -> &Arc<dyn ClipStorage> {
        &self.storage
    }

    /// Upload the clip of `event`, fetched from the Frigate at `source_url_base`.
    ///
    /// Returns `true` only when the download answered 200 and the backend
    /// accepted the file.
    pub async fn upload(&self, event: &Value, source_url_base: &str) -> bool {
        let descriptor = match EventDescriptor::from_event(event, self.timezone) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::error!(error = %e, "Cannot upload clip for malformed event");
                return false;
            }
        };

        let filename = descriptor.generate_filename();
        let folder_path = descriptor.generate_folder_path(self.storage.upload_folder());
        let video_url = generate_video_url(source_url_base, descriptor.event_id());

        // The backend logs why; nothing is downloaded without a destination.
        let Some(folder) = self.storage.create_event_folder(&folder_path).await else {
            tracing::debug!(
                event_id = %descriptor.event_id(),
                folder = %folder_path,
                "Destination folder unavailable, skipping download"
            );
            return false;
        };

        match self
            .transfer(&descriptor, &video_url, &folder, &filename)
            .await
        {
            Ok(uploaded) => uploaded,
            Err(UploadError::Download { url, source }) => {
                tracing::error!(
                    event_id = %descriptor.event_id(),
                    url = %url,
                    error = %source,
                    "Error downloading video"
                );
                false
            }
            Err(e) => {
                let details = match e {
                    UploadError::App(app) => app.detailed_message(),
                    other => AppError::from(anyhow::Error::new(other)).detailed_message(),
                };
                tracing::error!(
                    event_id = %descriptor.event_id(),
                    url = %video_url,
                    error = %details,
                    "Unexpected error while uploading clip"
                );
                false
            }
        }
    }

    async fn transfer(
        &self,
        descriptor: &EventDescriptor,
        video_url: &str,
        folder: &FolderHandle,
        filename: &str,
    ) -> Result<bool, UploadError> {
        let mut clip = ClipBuffer::new_in(&self.spool_dir)?;

        let mut response = self
            .http
            .get(video_url)
            .send()
            .await
            .map_err(UploadError::download(video_url))?;
        let status = response.status();

        if status == StatusCode::OK {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(UploadError::download(video_url))?
            {
                clip.write_chunk(&chunk).await?;
            }
            clip.rewind().await?;

            tracing::debug!(
                event_id = %descriptor.event_id(),
                size_bytes = clip.len(),
                "Clip downloaded, handing over to storage"
            );
            return Ok(self
                .storage
                .upload_video_file(clip, folder, filename, descriptor)
                .await);
        }

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let body = read_error_body(&mut response, video_url).await?;
            if is_clip_not_ready(&body) {
                self.handle_clip_not_ready(descriptor, video_url).await?;
                return Ok(false);
            }
        }

        tracing::error!(
            event_id = %descriptor.event_id(),
            url = %video_url,
            status = status.as_u16(),
            "Could not download video"
        );
        Ok(false)
    }

    /// Frigate has not produced the clip yet. After too many such attempts
    /// the event is flagged so it is no longer retried.
    async fn handle_clip_not_ready(
        &self,
        descriptor: &EventDescriptor,
        video_url: &str,
    ) -> Result<(), AppError> {
        let event_id = descriptor.event_id();
        tracing::warn!(event_id = %event_id, "Clip not found for event");

        // An event missing from the ledger has no recorded attempts.
        let tries = self.retry_store.select_tries(event_id).await?.unwrap_or(0);
        if tries >= self.max_clip_tries {
            self.retry_store.update_event(event_id, false, Some(false)).await?;
            tracing::error!(
                event_id = %event_id,
                url = %video_url,
                tries,
                "Clip creation failed, couldn't download its clip. Marking as non-retriable."
            );
        }

        Ok(())
    }
}

/// Read at most `MAX_ERROR_BODY_BYTES` of an error response.
async fn read_error_body(response: &mut Response, url: &str) -> Result<String, UploadError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(UploadError::download(url))? {
        let room = MAX_ERROR_BODY_BYTES - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= MAX_ERROR_BODY_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn is_clip_not_ready(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("message")
                .and_then(Value::as_str)
                .map(|message| message == CLIP_NOT_READY_MESSAGE)
        })
        .unwrap_or(false)
}
