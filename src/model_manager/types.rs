//! Model Manager Types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A curated model offered for download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardModel {
    /// Human-readable name
    pub name: String,
    /// Approximate size, as shown to the user (varies by quantization)
    pub size_label: String,
    pub description: String,
    /// Direct GGUF download URL
    pub download_url: String,
    /// Repositories hosting this model or alternative quantizations
    pub repository_links: Vec<RepositoryLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryLink {
    pub label: String,
    pub url: String,
}

/// Download progress information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadProgress {
    pub file_name: String,
    pub downloaded_bytes: u64,
    /// `None` when the server did not announce a length; render as indeterminate
    pub total_bytes: Option<u64>,
    pub status: DownloadStatus,
}

impl DownloadProgress {
    /// Percentage in 0..=100, only when the total is known
    pub fn percent(&self) -> Option<f32> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| ((self.downloaded_bytes as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as f32)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DownloadStatus {
    Downloading,
    /// Status line from the downloader (retry waits, interrupted attempts)
    Message(String),
    Complete,
    Failed(String),
}

/// Information about a locally cached model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalModelInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Transport limits for model downloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment
    pub connect: Duration,
    /// Longest wait for the next body chunk
    pub read: Duration,
    /// Longest wait for a chunk to reach the temp file
    pub write: Duration,
    /// Whole request, body included
    pub call: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read: Duration::from_secs(15 * 60),
            write: Duration::from_secs(15 * 60),
            call: Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub timeouts: TimeoutConfig,
    /// Hard failures tolerated before giving up
    pub max_attempts: u32,
    /// Consecutive busy responses (429, 503, ...) waited out before the next
    /// one counts as a hard failure
    pub max_retry_waits: u32,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            max_attempts: 3,
            max_retry_waits: 8,
            user_agent: "CiceroAI-ModelDownloader/1.0".to_string(),
        }
    }
}
