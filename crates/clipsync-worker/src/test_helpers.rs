//! In-memory collaborators for orchestrator and handler tests.

use async_trait::async_trait;
use clipsync_core::{AppError, EventDescriptor, FolderPath, RetryStore};
use clipsync_storage::{ClipBuffer, ClipStorage, FolderHandle, StorageBackend};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub folder: String,
    pub filename: String,
    pub data: Vec<u8>,
}

pub struct FakeStorage {
    pub folder_result: Option<FolderHandle>,
    pub upload_result: bool,
    pub folder_calls: AtomicUsize,
    pub requested_folders: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<RecordedUpload>>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            folder_result: Some(FolderHandle::new("folder-id")),
            upload_result: true,
            folder_calls: AtomicUsize::new(0),
            requested_folders: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_folder() -> Self {
        Self {
            folder_result: None,
            ..Self::new()
        }
    }

    pub fn failing_upload() -> Self {
        Self {
            upload_result: false,
            ..Self::new()
        }
    }

    pub fn folder_calls(&self) -> usize {
        self.folder_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipStorage for FakeStorage {
    fn upload_folder(&self) -> &str {
        "Frigate"
    }

    async fn create_event_folder(&self, folder_path: &FolderPath) -> Option<FolderHandle> {
        self.folder_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_folders
            .lock()
            .unwrap()
            .push(folder_path.to_string());
        self.folder_result.clone()
    }

    async fn upload_video_file(
        &self,
        mut clip: ClipBuffer,
        folder: &FolderHandle,
        filename: &str,
        _event: &EventDescriptor,
    ) -> bool {
        let data = clip.read_remaining().await.unwrap();
        self.uploads.lock().unwrap().push(RecordedUpload {
            folder: folder.to_string(),
            filename: filename.to_string(),
            data,
        });
        self.upload_result
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::WebDav
    }
}

pub struct FakeRetryStore {
    pub tries: Option<i64>,
    pub fail_select: bool,
    pub fail_update: bool,
    pub select_calls: AtomicUsize,
    pub updates: Mutex<Vec<(String, bool, Option<bool>)>>,
}

impl FakeRetryStore {
    pub fn with_tries(tries: Option<i64>) -> Self {
        Self {
            tries,
            fail_select: false,
            fail_update: false,
            select_calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_select() -> Self {
        Self {
            fail_select: true,
            ..Self::with_tries(None)
        }
    }

    pub fn failing_update(tries: i64) -> Self {
        Self {
            fail_update: true,
            ..Self::with_tries(Some(tries))
        }
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(String, bool, Option<bool>)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetryStore for FakeRetryStore {
    async fn select_tries(&self, _event_id: &str) -> Result<Option<i64>, AppError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_select {
            return Err(AppError::Internal("ledger unavailable".to_string()));
        }
        Ok(self.tries)
    }

    async fn update_event(
        &self,
        event_id: &str,
        uploaded: bool,
        retry: Option<bool>,
    ) -> Result<(), AppError> {
        if self.fail_update {
            return Err(AppError::Internal("ledger is read-only".to_string()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((event_id.to_string(), uploaded, retry));
        Ok(())
    }
}

/// Number of entries left in a spool directory
pub fn spool_entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
