//! WebDAV storage implementation

use crate::buffer::ClipBuffer;
use crate::traits::{ClipStorage, FolderHandle, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use clipsync_core::{EventDescriptor, FolderPath};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};

pub struct WebDavStorage {
    client: Client,
    host: String,
    user: Option<String>,
    password: Option<String>,
    upload_dir: String,
}

impl WebDavStorage {
    pub fn new(
        client: Client,
        host: impl Into<String>,
        user: Option<String>,
        password: Option<String>,
        upload_dir: impl Into<String>,
    ) -> Self {
        Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            user,
            password,
            upload_dir: upload_dir.into(),
        }
    }

    /// Absolute URL of a collection or resource, each segment percent-encoded
    fn url_for<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> String {
        let mut url = self.host.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.user {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    /// Create the collection at `url` unless it already exists.
    async fn make_collection(&self, url: &str) -> StorageResult<()> {
        let mkcol = Method::from_bytes(b"MKCOL")
            .map_err(|e| StorageError::ConfigError(format!("Invalid WebDAV method: {}", e)))?;
        let response = self.request(mkcol, url).send().await?;

        let status = response.status();
        // 405 means the collection is already there
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }

    async fn put_clip(&self, url: &str, clip: ClipBuffer) -> StorageResult<()> {
        let content_length = clip.len();
        let response = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, content_length)
            .body(clip.into_body())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ClipStorage for WebDavStorage {
    fn upload_folder(&self) -> &str {
        &self.upload_dir
    }

    async fn create_event_folder(&self, folder_path: &FolderPath) -> Option<FolderHandle> {
        for prefix in folder_path.prefixes() {
            let url = self.url_for(prefix.segments().iter().map(String::as_str));
            if let Err(e) = self.make_collection(&url).await {
                tracing::error!(
                    folder = %prefix,
                    error = %e,
                    "Failed to create WebDAV collection"
                );
                return None;
            }
        }

        Some(FolderHandle::new(folder_path.to_string()))
    }

    async fn upload_video_file(
        &self,
        clip: ClipBuffer,
        folder: &FolderHandle,
        filename: &str,
        event: &EventDescriptor,
    ) -> bool {
        let folder_path = FolderPath::new(folder.as_str());
        let url = self.url_for(
            folder_path
                .segments()
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(filename)),
        );
        let size_bytes = clip.len();

        match self.put_clip(&url, clip).await {
            Ok(()) => {
                tracing::info!(
                    event_id = %event.event_id(),
                    filename = %filename,
                    folder = %folder,
                    size_bytes,
                    "Video successfully uploaded to WebDAV"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id(),
                    filename = %filename,
                    error = %e,
                    "Error uploading to WebDAV"
                );
                false
            }
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::WebDav
    }
}
