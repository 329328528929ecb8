//! Configuration module
//!
//! This module provides the configuration structures for the uploader:
//! timezone and remote layout, storage backend credentials, the retry ledger
//! and the retry/maintenance policy knobs. Everything is read once at process
//! start and passed into constructors.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::storage_types::StorageBackend;

// Common constants
const DEFAULT_TIMEZONE: &str = "Europe/Istanbul";
const DEFAULT_UPLOAD_DIR: &str = "Frigate";
const DEFAULT_DATABASE_URL: &str = "sqlite://db/events.db";
const DEFAULT_GOOGLE_API_URL: &str = "https://www.googleapis.com";
const EVENT_RETENTION_DAYS: u32 = 40;
const MAX_CLIP_TRIES: i64 = 10;
const NOTIFY_AFTER_TRIES: i64 = 3;
const CLIP_SETTLE_DELAY_SECS: u64 = 5;
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Google Drive backend settings
#[derive(Clone, Debug, Default)]
pub struct GoogleDriveConfig {
    /// OAuth bearer token; obtaining and refreshing it happens outside Clipsync
    pub access_token: Option<String>,
    /// Root of the Drive REST API (overridable for tests and proxies)
    pub api_url: String,
    /// Days to keep uploaded clips on the drive. 0 = keep forever.
    pub retention_days: u32,
}

/// WebDAV backend settings
#[derive(Clone, Debug, Default)]
pub struct WebDavConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Zone used to render filenames and date folders
    pub timezone: Tz,
    /// Remote base folder for the `year/month/day` hierarchy
    pub upload_dir: String,
    /// Base URL of the Frigate instance events come from
    pub frigate_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub google_drive: GoogleDriveConfig,
    pub webdav: WebDavConfig,
    pub database_url: String,
    /// Days to keep uploaded events in the ledger
    pub event_retention_days: u32,
    /// "Clip not ready" attempts after which an event stops being retried
    pub max_clip_tries: i64,
    /// Failed attempts before an upload failure is logged at error level
    pub notify_after_tries: i64,
    pub clip_settle_delay_secs: u64,
    pub download_timeout_secs: u64,
    /// Directory for download spool files; system temp dir when unset
    pub spool_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        // TIMEZONE is the documented setting; TZ is only a fallback for
        // containers that already export it.
        let timezone_name = var("TIMEZONE")
            .or_else(|| var("TZ"))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = parse_timezone(&timezone_name)?;

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::GoogleDrive,
        };

        Ok(Config {
            timezone,
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            frigate_url: var("FRIGATE_URL").map(|url| url.trim_end_matches('/').to_string()),
            storage_backend,
            google_drive: GoogleDriveConfig {
                access_token: var("GOOGLE_DRIVE_ACCESS_TOKEN"),
                api_url: var("GOOGLE_DRIVE_API_URL")
                    .unwrap_or_else(|| DEFAULT_GOOGLE_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                retention_days: parse_number(var("GDRIVE_RETENTION_DAYS"), "GDRIVE_RETENTION_DAYS", 0)?,
            },
            webdav: WebDavConfig {
                host: var("WEBDAV_HOST").map(|host| host.trim_end_matches('/').to_string()),
                user: var("WEBDAV_USER"),
                password: var("WEBDAV_PASSWORD"),
            },
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            event_retention_days: parse_number(
                var("EVENT_RETENTION_DAYS"),
                "EVENT_RETENTION_DAYS",
                EVENT_RETENTION_DAYS,
            )?,
            max_clip_tries: parse_number(var("MAX_CLIP_TRIES"), "MAX_CLIP_TRIES", MAX_CLIP_TRIES)?,
            notify_after_tries: parse_number(
                var("NOTIFY_AFTER_TRIES"),
                "NOTIFY_AFTER_TRIES",
                NOTIFY_AFTER_TRIES,
            )?,
            clip_settle_delay_secs: parse_number(
                var("CLIP_SETTLE_DELAY_SECS"),
                "CLIP_SETTLE_DELAY_SECS",
                CLIP_SETTLE_DELAY_SECS,
            )?,
            download_timeout_secs: parse_number(
                var("DOWNLOAD_TIMEOUT_SECS"),
                "DOWNLOAD_TIMEOUT_SECS",
                DOWNLOAD_TIMEOUT_SECS,
            )?,
            spool_dir: var("SPOOL_DIR").map(PathBuf::from),
            log_level: var("LOGGING_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Check that the selected backend has everything it needs.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::GoogleDrive => {
                if self.google_drive.access_token.is_none() {
                    return Err(anyhow::anyhow!(
                        "GOOGLE_DRIVE_ACCESS_TOKEN must be set for the google_drive backend"
                    ));
                }
            }
            StorageBackend::WebDav => {
                if self.webdav.host.is_none() {
                    return Err(anyhow::anyhow!(
                        "WEBDAV_HOST must be set for the webdav backend"
                    ));
                }
            }
        }

        if self.upload_dir.trim_matches('/').is_empty() {
            return Err(anyhow::anyhow!("UPLOAD_DIR must name a folder"));
        }

        if self.max_clip_tries < 1 {
            return Err(anyhow::anyhow!("MAX_CLIP_TRIES must be at least 1"));
        }

        Ok(())
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn clip_settle_delay(&self) -> Duration {
        Duration::from_secs(self.clip_settle_delay_secs)
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

/// Parse an IANA zone name such as `Europe/Istanbul`.
pub fn parse_timezone(name: &str) -> Result<Tz, anyhow::Error> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("Invalid timezone `{}`: {}", name, e))
}

fn parse_number<T>(value: Option<String>, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got `{}`", key, raw)),
        None => Ok(default),
    }
}
