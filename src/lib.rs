// Cicero core - local model downloads, settings and inference sessions
//
// Everything here is UI-agnostic: a front end (or the sidecar binary)
// drives it through CoreState or the individual components.

pub mod config;
pub mod database;
pub mod error;
pub mod llama;
pub mod model_manager;
pub mod progress;
pub mod settings;
pub mod state;
pub mod tasks;
pub mod token_budget;

pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use llama::{Engine, EngineHandle, RuntimeConfig, SamplingConfig, SessionInfo, SessionManager};
pub use model_manager::{DownloadProgress, DownloadStatus, ModelDownloader, ModelStore};
pub use settings::{InferencePlan, PresetOption, SettingEdit, SettingsConfig, SettingsController};
pub use state::CoreState;
pub use token_budget::{compute_token_budget, derive_default_max_tokens, estimate_prompt_tokens, TokenBudget};
