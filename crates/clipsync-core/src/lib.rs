//! Clipsync Core Library
//!
//! This crate provides the configuration, error types, event model and
//! collaborator traits shared by every Clipsync component.

pub mod config;
pub mod error;
pub mod hooks;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, GoogleDriveConfig, WebDavConfig};
pub use error::{AppError, EventError};
pub use hooks::RetryStore;
pub use models::{EventDescriptor, FolderPath};
pub use storage_types::StorageBackend;
// Note: ClipStorage and ClipBuffer live in clipsync-storage
