#[cfg(feature = "storage-google-drive")]
use crate::GoogleDriveStorage;
#[cfg(feature = "storage-webdav")]
use crate::WebDavStorage;
use crate::{ClipStorage, StorageBackend, StorageError, StorageResult};
use clipsync_core::Config;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for clip transfers.
///
/// `DOWNLOAD_TIMEOUT_SECS` bounds each socket read rather than the whole
/// request, so a large clip on a slow link completes as long as data flows.
pub fn build_http_client(config: &Config) -> StorageResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(config.download_timeout())
        .build()
        .map_err(StorageError::from)
}

/// Create a storage backend based on configuration
pub fn create_storage(config: &Config) -> StorageResult<Arc<dyn ClipStorage>> {
    match config.storage_backend {
        #[cfg(feature = "storage-google-drive")]
        StorageBackend::GoogleDrive => {
            let access_token = config.google_drive.access_token.clone().ok_or_else(|| {
                StorageError::ConfigError("GOOGLE_DRIVE_ACCESS_TOKEN not configured".to_string())
            })?;

            let storage = GoogleDriveStorage::new(
                build_http_client(config)?,
                config.google_drive.api_url.clone(),
                access_token,
                config.upload_dir.clone(),
            );
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-google-drive"))]
        StorageBackend::GoogleDrive => Err(StorageError::ConfigError(
            "Google Drive backend not available (storage-google-drive feature not enabled)"
                .to_string(),
        )),

        #[cfg(feature = "storage-webdav")]
        StorageBackend::WebDav => {
            let host = config
                .webdav
                .host
                .clone()
                .ok_or_else(|| StorageError::ConfigError("WEBDAV_HOST not configured".to_string()))?;

            let storage = WebDavStorage::new(
                build_http_client(config)?,
                host,
                config.webdav.user.clone(),
                config.webdav.password.clone(),
                config.upload_dir.clone(),
            );
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-webdav"))]
        StorageBackend::WebDav => Err(StorageError::ConfigError(
            "WebDAV backend not available (storage-webdav feature not enabled)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_missing_drive_token_is_a_config_error() {
        let config = config_from(&[]);
        assert!(matches!(
            create_storage(&config),
            Err(StorageError::ConfigError(_))
        ));
    }

    #[cfg(feature = "storage-webdav")]
    #[test]
    fn test_webdav_backend_is_selected() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "webdav"),
            ("WEBDAV_HOST", "https://dav.example.com"),
            ("UPLOAD_DIR", "Cameras"),
        ]);
        let storage = create_storage(&config).unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::WebDav);
        assert_eq!(storage.upload_folder(), "Cameras");
    }

    #[cfg(feature = "storage-google-drive")]
    #[test]
    fn test_google_drive_backend_is_selected() {
        let config = config_from(&[("GOOGLE_DRIVE_ACCESS_TOKEN", "token")]);
        let storage = create_storage(&config).unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::GoogleDrive);
        assert_eq!(storage.upload_folder(), "Frigate");
    }

    /// Serve one response whose body bytes are written `gap` apart.
    async fn trickle_server(body: &'static [u8], gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: video/mp4\r\ncontent-length: {}\r\n\r\n",
                body.len()
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for byte in body {
                tokio::time::sleep(gap).await;
                if socket.write_all(std::slice::from_ref(byte)).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
        });
        format!("http://{}/clip.mp4", addr)
    }

    #[tokio::test]
    async fn test_slow_steady_transfer_outlives_the_timeout() {
        let config = config_from(&[("DOWNLOAD_TIMEOUT_SECS", "1")]);
        let client = build_http_client(&config).unwrap();
        let url = trickle_server(b"12345678", Duration::from_millis(400)).await;

        // 3.2 s in total, but no single read waits longer than 0.4 s
        let body = client.get(&url).send().await.unwrap().bytes().await.unwrap();
        assert_eq!(&body[..], b"12345678");
    }

    #[tokio::test]
    async fn test_stalled_transfer_times_out() {
        let config = config_from(&[("DOWNLOAD_TIMEOUT_SECS", "1")]);
        let client = build_http_client(&config).unwrap();
        let url = trickle_server(b"12", Duration::from_secs(3)).await;

        let result = match client.get(&url).send().await {
            Ok(response) => response.bytes().await.map(|_| ()),
            Err(e) => Err(e),
        };
        assert!(result.unwrap_err().is_timeout());
    }
}
