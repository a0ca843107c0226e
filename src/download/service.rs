//! Download orchestration around a [`MediaDownloader`].

use super::ytdlp::files_for_stem;
use super::{DownloadError, DownloadRequest, DownloadedMedia, MediaDownloader};
use crate::config::{Settings, DOWNLOAD_INITIAL_BACKOFF_MS, DOWNLOAD_MAX_BACKOFF_MS};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Semaphore;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs downloads with a global concurrency limit, retries transient
/// failures, enforces the upload ceiling and cleans up after itself.
pub struct DownloadService {
    downloader: Arc<dyn MediaDownloader>,
    downloads_dir: PathBuf,
    permits: Semaphore,
    retries: usize,
    max_upload_bytes: u64,
}

impl DownloadService {
    /// Create a service writing into `settings.downloads_dir`
    #[must_use]
    pub fn new(downloader: Arc<dyn MediaDownloader>, settings: &Settings) -> Self {
        Self {
            downloader,
            downloads_dir: settings.downloads_dir.clone(),
            permits: Semaphore::new(settings.max_concurrent_downloads.max(1)),
            retries: settings.download_retries,
            max_upload_bytes: settings.max_upload_bytes(),
        }
    }

    /// Directory holding in-flight files
    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Downloads that could start right now without waiting
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Download `request` into a fresh file.
    ///
    /// Waits for a free slot first. On failure every file written for this
    /// request is removed.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted, or
    /// [`DownloadError::TooLarge`] when the result exceeds the upload limit.
    pub async fn fetch(&self, request: &DownloadRequest) -> Result<DownloadedMedia, DownloadError> {
        tokio::fs::create_dir_all(&self.downloads_dir).await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DownloadError::Failed("download service is shutting down".to_string()))?;

        let stem = self.downloads_dir.join(Uuid::new_v4().as_simple().to_string());
        info!(url = %request.url, target = ?request.target, stem = %stem.display(), "Starting download");

        let strategy = ExponentialBackoff::from_millis(DOWNLOAD_INITIAL_BACKOFF_MS)
            .max_delay(Duration::from_millis(DOWNLOAD_MAX_BACKOFF_MS))
            .map(jitter)
            .take(self.retries);

        let downloader = &self.downloader;
        let stem_ref = stem.as_path();
        let result = RetryIf::spawn(
            strategy,
            || async move {
                let attempt = downloader.download(request, stem_ref).await;
                if let Err(ref e) = attempt {
                    if e.is_transient() {
                        warn!(error = %e, "Transient download failure");
                        remove_stem_files(stem_ref).await;
                    }
                }
                attempt
            },
            DownloadError::is_transient,
        )
        .await;

        let media = match result {
            Ok(media) => media,
            Err(e) => {
                remove_stem_files(&stem).await;
                return Err(e);
            }
        };

        if media.size_bytes > self.max_upload_bytes {
            let err = DownloadError::TooLarge {
                size_mb: bytes_to_mb(media.size_bytes),
                limit_mb: self.max_upload_bytes / (1024 * 1024),
            };
            warn!(path = %media.path.display(), error = %err, "Discarding oversized download");
            self.discard(&media.path).await;
            remove_stem_files(&stem).await;
            return Err(err);
        }

        Ok(media)
    }

    /// Delete a delivered file; failures are logged, not returned
    pub async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed local file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove local file"),
        }
    }

    /// Remove files older than `max_age` from the downloads directory.
    ///
    /// Returns how many files were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub async fn purge_stale(&self, max_age: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.downloads_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age >= max_age {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to purge stale file"),
                }
            }
        }
        Ok(removed)
    }
}

async fn remove_stem_files(stem: &Path) {
    match files_for_stem(stem).await {
        Ok(files) => {
            for file in files {
                if let Err(e) = tokio::fs::remove_file(&file).await {
                    warn!(path = %file.display(), error = %e, "Failed to remove partial file");
                }
            }
        }
        Err(e) => warn!(stem = %stem.display(), error = %e, "Failed to list partial files"),
    }
}

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
