//! Domain models
//!
//! This module contains the value types derived from Frigate event records.

pub mod event;
pub mod folder;

pub use event::EventDescriptor;
pub use folder::FolderPath;
