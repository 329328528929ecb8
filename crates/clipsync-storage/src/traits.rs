//! Storage abstraction trait
//!
//! This module defines the ClipStorage trait that all upload destinations must implement.

use crate::buffer::ClipBuffer;
use crate::StorageBackend;
use async_trait::async_trait;
use clipsync_core::{EventDescriptor, FolderPath};
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Response is missing `{0}`")]
    MissingField(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Opaque identifier of a destination folder
///
/// A Drive folder id for Google Drive, the folder path for WebDAV.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderHandle(String);

impl FolderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FolderHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Upload destination trait
///
/// Both operations report failure through their return value rather than an
/// error: the backend logs the cause and the orchestrator only needs to know
/// whether to continue.
#[async_trait]
pub trait ClipStorage: Send + Sync {
    /// Base folder the date hierarchy is created under
    fn upload_folder(&self) -> &str;

    /// Ensure every segment of `folder_path` exists and return the leaf
    /// folder, or `None` if any segment could not be found or created.
    async fn create_event_folder(&self, folder_path: &FolderPath) -> Option<FolderHandle>;

    /// Write the whole clip as `filename` inside `folder`.
    ///
    /// The clip is consumed; its spool file is removed once the upload
    /// finishes, whatever the outcome.
    async fn upload_video_file(
        &self,
        clip: ClipBuffer,
        folder: &FolderHandle,
        filename: &str,
        event: &EventDescriptor,
    ) -> bool;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Delete clips older than `retention_days` and return how many were removed.
    ///
    /// Backends without retention support keep everything.
    async fn cleanup_expired(&self, retention_days: u32) -> StorageResult<u64> {
        tracing::debug!(
            backend = %self.backend_type(),
            retention_days,
            "Retention cleanup not supported by backend, skipping"
        );
        Ok(0)
    }
}
