use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// Selects which remote destination clips are uploaded to. It's defined in
/// core because configuration parses it and the storage factory matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    GoogleDrive,
    WebDav,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google_drive" | "gdrive" | "drive" => Ok(StorageBackend::GoogleDrive),
            "webdav" => Ok(StorageBackend::WebDav),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::GoogleDrive => write!(f, "google_drive"),
            StorageBackend::WebDav => write!(f, "webdav"),
        }
    }
}
