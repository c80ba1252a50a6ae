//! Core configuration: where data lives and how downloads behave

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model_manager::DownloaderConfig;

const APP_DIR_NAME: &str = "cicero";
const MODELS_DIR_NAME: &str = "models";
const DATABASE_FILE_NAME: &str = "cicero.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub downloader: DownloaderConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        Self::with_data_dir(data_dir)
    }
}

impl CoreConfig {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            downloader: DownloaderConfig::default(),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join(MODELS_DIR_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }
}

/// Inference threads to use when the runtime settings do not say
pub fn default_thread_count() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().clamp(1, 8) as i32)
        .unwrap_or(4)
}
