//! Clipsync Worker
//!
//! Upload orchestration for Frigate event clips: the `ClipUploader` moves one
//! clip from Frigate to the configured storage backend, `EventHandler` wraps
//! it with the ledger-driven retry policy, `feed` drives the handler from
//! newline-delimited events, and `Maintenance` runs the periodic cleanup and
//! reporting jobs.

pub mod feed;
pub mod frigate;
pub mod handler;
pub mod maintenance;
pub mod telemetry;
pub mod uploader;

#[cfg(test)]
mod test_helpers;

pub use feed::{run_event_feed, stdin_lines, FeedStats};
pub use frigate::generate_video_url;
pub use handler::{EventHandler, HandleOutcome};
pub use maintenance::{Maintenance, MaintenanceConfig};
pub use telemetry::init_tracing;
pub use uploader::{ClipUploader, CLIP_NOT_READY_MESSAGE};
