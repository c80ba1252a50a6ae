//! Model Download Logic
//!
//! Streams a remote artifact into a private temp file in the models directory
//! and renames it into place only once every byte has arrived, so readers of
//! the store never see a partial model.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use tokio::io::AsyncWriteExt;

use crate::error::{CoreError, Result};
use super::store::{safe_file_name, ModelStore, TEMP_SUFFIX};
use super::types::DownloaderConfig;

const ACCEPT_HEADER: &str = "application/octet-stream, */*";
const MAX_RETRY_AFTER_SECS: u64 = 600;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_BACKOFF_EXPONENT: u32 = 10;
const RETRYABLE_STATUS_CODES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

pub const STATUS_DOWNLOADING: &str = "Downloading model…";

enum AttemptOutcome {
    Completed { bytes: u64 },
    Busy { status: StatusCode, retry_after_secs: Option<u64> },
}

/// A temp download file that deletes itself unless it was committed.
/// Removal happens in `Drop`, so it also runs when the download future is
/// dropped by a cancellation.
struct TempDownload {
    path: PathBuf,
    armed: bool,
}

impl TempDownload {
    fn new(dir: &Path, prefix: &str) -> Self {
        let name = format!("{}-{}{}", prefix, uuid::Uuid::new_v4().simple(), TEMP_SUFFIX);
        Self {
            path: dir.join(name),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed temp file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

/// Downloads model files into a [`ModelStore`] with retries and backoff
pub struct ModelDownloader {
    client: Client,
    store: ModelStore,
    config: DownloaderConfig,
}

impl ModelDownloader {
    pub fn new(store: ModelStore, config: DownloaderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeouts.connect)
            .timeout(config.timeouts.call)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CoreError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, store, config })
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Download `url` into the store as `file_name` and return the committed path.
    ///
    /// Busy responses (408, 425, 429, 5xx gateway errors) are waited out using
    /// `Retry-After` or exponential backoff without consuming an attempt.
    /// Other HTTP errors, transport errors, timeouts and truncated bodies each
    /// consume one of `max_attempts`; the last one is returned once they run out.
    pub async fn download<P, S>(
        &self,
        url: &str,
        file_name: &str,
        on_progress: P,
        on_status: S,
    ) -> Result<PathBuf>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
        S: Fn(&str) + Send + Sync,
    {
        let parsed = Url::parse(url.trim())
            .map_err(|e| CoreError::InvalidArgument(format!("Invalid URL {:?}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::InvalidArgument(
                "URL must use the HTTP or HTTPS scheme".to_string(),
            ));
        }
        let safe_name = safe_file_name(file_name)
            .ok_or_else(|| CoreError::InvalidArgument(format!("Invalid file name: {:?}", file_name)))?;

        self.store.ensure_dir()?;
        let models_dir = self.store.models_dir();
        let target = models_dir.join(&safe_name);
        let prefix = temp_prefix(&safe_name);

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;
        let mut wait_count = 0u32;
        let mut last_error: Option<CoreError> = None;

        log::info!("Downloading {} to {}", parsed, target.display());
        on_status(STATUS_DOWNLOADING);

        while attempt < max_attempts {
            let temp = TempDownload::new(models_dir, &prefix);

            let result = match self.attempt(parsed.clone(), &temp, &on_progress, &mut wait_count).await {
                Ok(AttemptOutcome::Completed { bytes }) => commit(temp, &target).await.map(|_| Some(bytes)),
                Ok(AttemptOutcome::Busy { status, retry_after_secs }) => {
                    drop(temp);
                    if wait_count >= self.config.max_retry_waits {
                        Err(CoreError::Transport(format!(
                            "Server still busy ({}) after {} retries",
                            status, wait_count
                        )))
                    } else {
                        let delay = compute_retry_delay(retry_after_secs, wait_count);
                        wait_count += 1;
                        log::warn!("Server busy ({}), retrying in {:?}", status, delay);
                        on_status(&format!("Server busy, retrying in {}", format_delay(delay)));
                        tokio::time::sleep(delay).await;
                        on_status(STATUS_DOWNLOADING);
                        Ok(None)
                    }
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(Some(bytes)) => {
                    log::info!("Downloaded {} bytes to {}", bytes, target.display());
                    return Ok(target);
                }
                Ok(None) => continue,
                Err(e) => {
                    attempt += 1;
                    wait_count = 0;
                    log::warn!("Download attempt {}/{} failed: {}", attempt, max_attempts, e);
                    if attempt < max_attempts {
                        on_status(&format!("Download interrupted, retrying ({}/{})", attempt + 1, max_attempts));
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::Transport("Download failed".to_string())))
    }

    async fn attempt<P>(
        &self,
        url: Url,
        temp: &TempDownload,
        on_progress: &P,
        wait_count: &mut u32,
    ) -> Result<AttemptOutcome>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
    {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| CoreError::Transport(format!("Failed to start download: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            if RETRYABLE_STATUS_CODES.contains(&status.as_u16()) {
                let retry_after_secs = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                return Ok(AttemptOutcome::Busy { status, retry_after_secs });
            }
            return Err(CoreError::Transport(format!("Download failed with status: {}", status)));
        }

        let total_bytes = response.content_length().filter(|len| *len > 0);
        let mut file = tokio::fs::File::create(temp.path())
            .await
            .map_err(|e| CoreError::io("Failed to create temp file", e))?;

        let timeouts = &self.config.timeouts;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let next = tokio::time::timeout(timeouts.read, stream.next())
                .await
                .map_err(|_| CoreError::Transport(format!("No data received for {:?}", timeouts.read)))?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| CoreError::Transport(format!("Download error: {}", e)))?;

            tokio::time::timeout(timeouts.write, file.write_all(&chunk))
                .await
                .map_err(|_| CoreError::Transport(format!("Writing chunk took longer than {:?}", timeouts.write)))?
                .map_err(|e| CoreError::io("Failed to write chunk", e))?;

            downloaded += chunk.len() as u64;
            *wait_count = 0;
            on_progress(downloaded, total_bytes);
        }

        file.flush()
            .await
            .map_err(|e| CoreError::io("Failed to flush file", e))?;
        drop(file);

        if let Some(total) = total_bytes {
            if downloaded != total {
                return Err(CoreError::Transport(format!(
                    "Download interrupted: received {} of {} bytes",
                    downloaded, total
                )));
            }
        }

        Ok(AttemptOutcome::Completed { bytes: downloaded })
    }
}

/// Replace `target` with the finished temp file. Falls back to copy + delete
/// when the rename is refused; the temp guard removes the source either way.
async fn commit(temp: TempDownload, target: &Path) -> Result<()> {
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        tokio::fs::remove_file(target)
            .await
            .map_err(|e| CoreError::io("Failed to replace existing model", e))?;
    }

    let renamed = tokio::fs::rename(temp.path(), target).await;
    match renamed {
        Ok(()) => {
            temp.disarm();
            Ok(())
        }
        Err(e) => {
            log::warn!("Rename into place failed ({}), copying instead", e);
            tokio::fs::copy(temp.path(), target)
                .await
                .map_err(|e| CoreError::io("Failed to copy temp file into place", e))?;
            Ok(())
        }
    }
}

fn temp_prefix(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or_default();
    if stem.chars().count() >= 3 {
        stem.to_string()
    } else {
        "model".to_string()
    }
}

/// Seconds from a `Retry-After` header; HTTP-date values are not supported
pub(crate) fn parse_retry_after(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok().map(|secs| secs.max(0) as u64)
}

/// `Retry-After` (capped at 10 minutes) when positive, else
/// 1 s × 2^wait_count capped at 60 s.
pub(crate) fn compute_retry_delay(retry_after_secs: Option<u64>, wait_count: u32) -> Duration {
    if let Some(secs) = retry_after_secs.map(|s| s.min(MAX_RETRY_AFTER_SECS)).filter(|s| *s > 0) {
        return Duration::from_secs(secs);
    }
    let backoff = INITIAL_BACKOFF * (1u32 << wait_count.min(MAX_BACKOFF_EXPONENT));
    backoff.min(MAX_BACKOFF)
}

fn format_delay(delay: Duration) -> String {
    let total = delay.as_secs().max(1);
    let (minutes, seconds) = (total / 60, total % 60);
    let plural = |n: u64, unit: &str| format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" });
    match (minutes, seconds) {
        (0, s) => plural(s, "second"),
        (m, 0) => plural(m, "minute"),
        (m, s) => format!("{} {}", plural(m, "minute"), plural(s, "second")),
    }
}
