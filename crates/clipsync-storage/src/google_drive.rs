//! Google Drive storage implementation
//!
//! Talks to the Drive v3 REST API with a bearer token. Folders are resolved
//! one path segment at a time and cached by `(parent, name)`; clips go up
//! through a resumable upload session so the body can be streamed from the
//! spool file.

use crate::buffer::ClipBuffer;
use crate::traits::{ClipStorage, FolderHandle, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use clipsync_core::{EventDescriptor, FolderPath};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const VIDEO_MIME_TYPE: &str = "video/mp4";

type FolderKey = (Option<String>, String);

#[derive(Debug, Default, Deserialize)]
struct DriveFile {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

pub struct GoogleDriveStorage {
    client: Client,
    api_url: String,
    access_token: String,
    upload_dir: String,
    folder_cache: Mutex<HashMap<FolderKey, String>>,
    creation_lock: tokio::sync::Mutex<()>,
}

impl GoogleDriveStorage {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        access_token: impl Into<String>,
        upload_dir: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            upload_dir: upload_dir.into(),
            folder_cache: Mutex::new(HashMap::new()),
            creation_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_url)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<FolderKey, String>> {
        // The map stays consistent even if a holder panicked.
        self.folder_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached_folder(&self, name: &str, parent: Option<&str>) -> Option<String> {
        self.cache()
            .get(&(parent.map(str::to_string), name.to_string()))
            .cloned()
    }

    fn evict_folder(&self, folder_id: &str) {
        self.cache().retain(|(parent, _), id| {
            id.as_str() != folder_id && parent.as_deref() != Some(folder_id)
        });
    }

    /// Return the id of folder `name` under `parent`, creating it when absent.
    ///
    /// Creation is serialised so two concurrent uploads for the same day
    /// cannot create duplicate folders.
    pub async fn find_or_create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> StorageResult<String> {
        if let Some(id) = self.cached_folder(name, parent) {
            return Ok(id);
        }

        let _guard = self.creation_lock.lock().await;
        if let Some(id) = self.cached_folder(name, parent) {
            return Ok(id);
        }

        let id = match self.find_folder(name, parent).await? {
            Some(id) => id,
            None => {
                let id = self.create_folder(name, parent).await?;
                tracing::info!(folder = %name, folder_id = %id, "Created Google Drive folder");
                id
            }
        };

        self.cache()
            .insert((parent.map(str::to_string), name.to_string()), id.clone());
        Ok(id)
    }

    async fn find_folder(&self, name: &str, parent: Option<&str>) -> StorageResult<Option<String>> {
        let mut query = format!(
            "name='{}' and mimeType='{}' and trashed=false",
            escape_query(name),
            FOLDER_MIME_TYPE
        );
        if let Some(parent) = parent {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }

        let list = self.list_files(&query, "files(id)", None).await?;
        Ok(list.files.into_iter().find_map(|file| file.id))
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> StorageResult<String> {
        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent {
            metadata["parents"] = json!([parent]);
        }

        let response = self
            .client
            .post(self.files_url())
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let file: DriveFile = check_status(response).await?.json().await?;

        file.id.ok_or_else(|| StorageError::MissingField("id".to_string()))
    }

    async fn list_files(
        &self,
        query: &str,
        fields: &str,
        page_token: Option<&str>,
    ) -> StorageResult<FileList> {
        let mut request = self
            .client
            .get(self.files_url())
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("spaces", "drive"), ("fields", fields)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Ids of every file matching `query`, following pagination.
    async fn list_all_ids(&self, query: &str) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_files(query, "nextPageToken, files(id)", page_token.as_deref())
                .await?;
            ids.extend(page.files.into_iter().filter_map(|file| file.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn is_folder_empty(&self, folder_id: &str) -> StorageResult<bool> {
        let query = format!("'{}' in parents and trashed=false", escape_query(folder_id));
        let list = self.list_files(&query, "files(id)", None).await?;
        Ok(list.files.is_empty())
    }

    async fn delete_file(&self, file_id: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.files_url(), urlencoding::encode(file_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(file_id.to_string()));
        }
        check_status(response).await?;
        Ok(())
    }

    async fn start_upload_session(
        &self,
        filename: &str,
        folder: &FolderHandle,
        content_length: u64,
    ) -> StorageResult<String> {
        let metadata = json!({
            "name": filename,
            "parents": [folder.as_str()],
        });

        let response = self
            .client
            .post(format!("{}/upload/drive/v3/files", self.api_url))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", VIDEO_MIME_TYPE)
            .header("X-Upload-Content-Length", content_length.to_string())
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StorageError::MissingField("Location".to_string()))
    }

    async fn upload_to_session(&self, session_url: &str, clip: ClipBuffer) -> StorageResult<Option<String>> {
        let content_length = clip.len();

        let response = self
            .client
            .put(session_url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, VIDEO_MIME_TYPE)
            .header(CONTENT_LENGTH, content_length)
            .body(clip.into_body())
            .send()
            .await?;
        let file: DriveFile = check_status(response).await?.json().await?;

        Ok(file.id)
    }

    /// Resolve the configured upload folder without creating anything.
    async fn find_upload_root(&self) -> StorageResult<Option<String>> {
        let mut parent: Option<String> = None;
        for segment in FolderPath::new(&self.upload_dir).segments() {
            match self.find_folder(segment, parent.as_deref()).await? {
                Some(id) => parent = Some(id),
                None => return Ok(None),
            }
        }
        Ok(parent)
    }

    /// Delete clips created before `cutoff` below the upload folder, then
    /// remove any folder left empty. The upload folder itself is kept.
    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let Some(root_id) = self.find_upload_root().await? else {
            tracing::warn!(
                upload_dir = %self.upload_dir,
                "Upload folder not found on Google Drive, skipping retention cleanup"
            );
            return Ok(0);
        };

        let cutoff = cutoff.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.cleanup_folder(&root_id, &cutoff).await
    }

    fn cleanup_folder<'a>(&'a self, folder_id: &'a str, cutoff: &'a str) -> BoxFuture<'a, StorageResult<u64>> {
        async move {
            let mut deleted = 0u64;

            let clips_query = format!(
                "'{}' in parents and mimeType='{}' and createdTime < '{}' and trashed=false",
                escape_query(folder_id),
                VIDEO_MIME_TYPE,
                cutoff
            );
            for file_id in self.list_all_ids(&clips_query).await? {
                match self.delete_file(&file_id).await {
                    Ok(()) => deleted += 1,
                    Err(StorageError::NotFound(_)) => {
                        tracing::warn!(file_id = %file_id, "Expired clip already gone")
                    }
                    Err(e) => return Err(e),
                }
            }

            let folders_query = format!(
                "'{}' in parents and mimeType='{}' and trashed=false",
                escape_query(folder_id),
                FOLDER_MIME_TYPE
            );
            for child_id in self.list_all_ids(&folders_query).await? {
                deleted += self.cleanup_folder(&child_id, cutoff).await?;

                if self.is_folder_empty(&child_id).await? {
                    match self.delete_file(&child_id).await {
                        Ok(()) => tracing::debug!(folder_id = %child_id, "Removed empty folder"),
                        Err(StorageError::NotFound(_)) => {
                            tracing::warn!(folder_id = %child_id, "Empty folder already gone")
                        }
                        Err(e) => return Err(e),
                    }
                    self.evict_folder(&child_id);
                }
            }

            Ok(deleted)
        }
        .boxed()
    }
}

#[async_trait]
impl ClipStorage for GoogleDriveStorage {
    fn upload_folder(&self) -> &str {
        &self.upload_dir
    }

    async fn create_event_folder(&self, folder_path: &FolderPath) -> Option<FolderHandle> {
        let mut parent: Option<String> = None;

        for segment in folder_path.segments() {
            match self.find_or_create_folder(segment, parent.as_deref()).await {
                Ok(id) => parent = Some(id),
                Err(e) => {
                    tracing::error!(
                        folder = %segment,
                        path = %folder_path,
                        error = %e,
                        "Failed to find or create folder"
                    );
                    return None;
                }
            }
        }

        parent.map(FolderHandle::new)
    }

    async fn upload_video_file(
        &self,
        clip: ClipBuffer,
        folder: &FolderHandle,
        filename: &str,
        event: &EventDescriptor,
    ) -> bool {
        let size_bytes = clip.len();

        let result = async {
            let session_url = self.start_upload_session(filename, folder, size_bytes).await?;
            self.upload_to_session(&session_url, clip).await
        }
        .await;

        match result {
            Ok(Some(file_id)) => {
                tracing::info!(
                    event_id = %event.event_id(),
                    filename = %filename,
                    file_id = %file_id,
                    size_bytes,
                    "Video successfully uploaded to Google Drive"
                );
                true
            }
            Ok(None) => {
                tracing::error!(
                    event_id = %event.event_id(),
                    filename = %filename,
                    "Failed to upload video to Google Drive. No file ID returned."
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id(),
                    filename = %filename,
                    error = %e,
                    "Error uploading to Google Drive"
                );
                false
            }
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::GoogleDrive
    }

    async fn cleanup_expired(&self, retention_days: u32) -> StorageResult<u64> {
        if retention_days == 0 {
            return Ok(0);
        }

        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        let deleted = self.cleanup_before(cutoff).await?;
        tracing::info!(retention_days, deleted, "Google Drive retention cleanup finished");
        Ok(deleted)
    }
}

/// Quote a value for use inside a single-quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

async fn check_status(response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StorageError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}
