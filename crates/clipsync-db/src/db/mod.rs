//! Database repositories for data access layer
//!
//! The only entity is the event ledger; `connect` opens (and creates, if
//! needed) the SQLite file it lives in.

pub mod events;

pub use events::EventRepository;

use clipsync_core::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 5;

/// Open a connection pool, creating the database file and its directory when missing.
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!(path = %parent.display(), "Created missing database directory");
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    tracing::info!(database_url = %database_url, "Connected to SQLite database");
    Ok(pool)
}
