//! Error types module
//!
//! This module provides the core error types used throughout Clipsync.
//! Crate-spanning failures are unified under `AppError`; building an
//! `EventDescriptor` from raw event data fails with the narrower `EventError`.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Reasons raw event data cannot be turned into an `EventDescriptor`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventError {
    #[error("Event data is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Event field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Event start_time {0} is not a representable Unix timestamp")]
    InvalidTimestamp(f64),

    #[error("Event is not valid JSON: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] EventError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidEvent(EventError::Malformed(err.to_string()))
    }
}

impl AppError {
    /// Whether retrying the same operation later could succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Config(_) | AppError::InvalidEvent(_))
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_event_is_not_recoverable() {
        let err = AppError::from(EventError::MissingField("camera"));
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "Invalid event: Event data is missing required field `camera`"
        );
    }

    #[test]
    fn test_database_error_is_recoverable() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_bad_json_is_an_invalid_event() {
        let err = AppError::from(serde_json::from_str::<serde_json::Value>("{oops").unwrap_err());
        assert!(matches!(err, AppError::InvalidEvent(EventError::Malformed(_))));
        assert!(!err.is_recoverable());
        assert!(!AppError::Config("FRIGATE_URL is not set".to_string()).is_recoverable());
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("disk full").context("writing spool file"));
        let details = err.detailed_message();
        assert!(details.starts_with("Internal error with source"));
        assert!(details.contains("Caused by: writing spool file"));
    }
}
