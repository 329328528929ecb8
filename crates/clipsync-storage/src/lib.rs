//! Clipsync Storage Library
//!
//! This crate provides the destination abstraction for uploaded clips and its
//! implementations for Google Drive and WebDAV shares.
//!
//! # Folder layout
//!
//! Clips land in `{upload_dir}/{year}/{month}/{day}/{filename}`. Backends
//! receive the full `FolderPath` and must create any missing segment; the
//! handle they return identifies the leaf folder for the subsequent upload.

pub mod buffer;
pub mod factory;
#[cfg(feature = "storage-google-drive")]
pub mod google_drive;
pub mod traits;
#[cfg(feature = "storage-webdav")]
pub mod webdav;

// Re-export commonly used types
pub use buffer::{ClipBuffer, SPOOL_CHUNK_SIZE};
pub use clipsync_core::StorageBackend;
pub use factory::{build_http_client, create_storage};
#[cfg(feature = "storage-google-drive")]
pub use google_drive::GoogleDriveStorage;
pub use traits::{ClipStorage, FolderHandle, StorageError, StorageResult};
#[cfg(feature = "storage-webdav")]
pub use webdav::WebDavStorage;
