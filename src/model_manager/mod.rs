//! Model Manager
//!
//! Downloads and stores GGUF models on local disk.
//!
//! Module structure:
//! - types.rs: StandardModel, DownloadProgress, LocalModelInfo, DownloaderConfig
//! - registry.rs: Standard model catalog, file name resolution
//! - store.rs: ModelStore over the models directory
//! - downloader.rs: Resilient download with retry and atomic commit

pub mod types;
pub mod registry;
pub mod store;
pub mod downloader;

pub use types::{
    DownloadProgress, DownloadStatus, DownloaderConfig, LocalModelInfo, RepositoryLink, StandardModel,
    TimeoutConfig,
};
pub use registry::{find_standard_model, resolve_file_name, standard_models};
pub use store::{safe_file_name, ModelStore};
pub use downloader::ModelDownloader;
