//! Hooks and traits for external collaborators
//!
//! The upload orchestrator consults a retry ledger to decide when a clip
//! that keeps failing should stop being retried. The ledger itself lives in
//! `clipsync-db`; this trait is the contract the orchestrator depends on.

use async_trait::async_trait;

use crate::error::AppError;

/// Retry-count persistence consumed by the upload orchestrator
///
/// Implementations must make each call individually atomic. Reading the
/// count and then writing the flag are two separate calls, so concurrent
/// attempts for the same event may interleave between them.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Number of recorded attempts for the event, or `None` if it is unknown
    async fn select_tries(&self, event_id: &str) -> Result<Option<i64>, AppError>;

    /// Record an attempt outcome. `retry = Some(false)` marks the event
    /// non-retriable; `None` leaves the flag untouched.
    async fn update_event(
        &self,
        event_id: &str,
        uploaded: bool,
        retry: Option<bool>,
    ) -> Result<(), AppError>;
}
