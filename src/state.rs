// State management for Cicero
//
// CoreState owns one of every component and runs the two request flows:
// download -> store -> settings -> session, and
// settings -> plan -> session -> engine.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{default_thread_count, CoreConfig};
use crate::database::DatabaseManager;
use crate::error::{CoreError, Result};
use crate::llama::{Engine, SessionInfo, SessionManager};
use crate::model_manager::{resolve_file_name, DownloadProgress, DownloadStatus, ModelDownloader, ModelStore};
use crate::progress::ProgressChannel;
use crate::settings::{SettingsController, SettingsStore, SqliteSettingsStore};
use crate::tasks::{TaskKind, TaskRegistry};

pub struct CoreState {
    config: CoreConfig,
    store: ModelStore,
    downloader: ModelDownloader,
    settings: Arc<SettingsController>,
    sessions: SessionManager,
    tasks: TaskRegistry,
    downloads: ProgressChannel<DownloadProgress>,
    watch_cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl CoreState {
    /// Open the settings database under `config.data_dir` and wire everything up
    pub async fn open(config: CoreConfig, engine: Arc<dyn Engine>) -> Result<Self> {
        let db = Arc::new(DatabaseManager::new(config.database_path())?);
        let settings_store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(db)?);
        Self::with_settings_store(config, engine, settings_store).await
    }

    pub async fn with_settings_store(
        config: CoreConfig,
        engine: Arc<dyn Engine>,
        settings_store: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let store = ModelStore::new(config.models_dir());
        store.ensure_dir()?;
        match store.sweep_temp_files() {
            Ok(0) => {}
            Ok(n) => log::info!("Removed {} stale download file(s)", n),
            Err(e) => log::warn!("Failed to sweep stale downloads: {}", e),
        }

        let downloader = ModelDownloader::new(store.clone(), config.downloader.clone())?;
        let settings = Arc::new(SettingsController::load(settings_store).await);
        let watch_cancel = CancellationToken::new();
        settings.clone().spawn_watch(watch_cancel.clone());

        Ok(Self {
            config,
            store,
            downloader,
            settings,
            sessions: SessionManager::new(engine),
            tasks: TaskRegistry::new(),
            downloads: ProgressChannel::new(),
            watch_cancel,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelStore {
        &self.store
    }

    pub fn settings(&self) -> &Arc<SettingsController> {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn subscribe_downloads(&self) -> broadcast::Receiver<DownloadProgress> {
        self.downloads.subscribe()
    }

    pub fn subscribe_tokens(&self) -> broadcast::Receiver<String> {
        self.sessions.subscribe_tokens()
    }

    /// Download a model, remember it as the selected one and load it.
    /// A newer call cancels this one.
    pub async fn download_model(&self, url: &str, file_name: Option<&str>) -> Result<PathBuf> {
        let file_name = file_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| resolve_file_name(url));

        let ticket = self.tasks.begin(TaskKind::Download);
        let progress = self.downloads.clone();
        let status = self.downloads.clone();
        let progress_name = file_name.clone();
        let status_name = file_name.clone();

        let result = tokio::select! {
            _ = ticket.cancel_token.cancelled() => Err(CoreError::Cancelled),
            result = self.downloader.download(
                url,
                &file_name,
                move |downloaded_bytes, total_bytes| {
                    progress.publish(DownloadProgress {
                        file_name: progress_name.clone(),
                        downloaded_bytes,
                        total_bytes,
                        status: DownloadStatus::Downloading,
                    })
                },
                move |message| {
                    status.publish(DownloadProgress {
                        file_name: status_name.clone(),
                        downloaded_bytes: 0,
                        total_bytes: None,
                        status: DownloadStatus::Message(message.to_string()),
                    })
                },
            ) => result,
        };
        self.tasks.finish(&ticket);

        let path = match result {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Download of {} failed: {}", file_name, e);
                self.publish_final(&file_name, DownloadStatus::Failed(e.to_string()));
                return Err(e);
            }
        };
        self.publish_final(&file_name, DownloadStatus::Complete);

        let path_str = path.to_string_lossy().to_string();
        self.settings.update_model_path(Some(path_str.as_str())).await;
        self.prepare_model(&path).await?;
        Ok(path)
    }

    /// Select a cached model by file name and load it
    pub async fn select_model(&self, name: &str) -> Result<SessionInfo> {
        let path = self
            .store
            .resolve(name)
            .ok_or_else(|| CoreError::InvalidArgument(format!("Model not found: {}", name)))?;
        let path_str = path.to_string_lossy().to_string();
        self.settings.update_model_path(Some(path_str.as_str())).await;
        self.prepare_model(&path).await
    }

    /// Re-select after the cache changed: the saved model if still cached,
    /// else the model currently loaded if still cached, else nothing.
    pub async fn restore_selection(&self) -> Result<Option<SessionInfo>> {
        let saved = self
            .settings
            .snapshot()
            .await
            .model_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().to_string());
        let loaded = self
            .sessions
            .current()
            .await
            .and_then(|info| info.model_path.file_name().map(|n| n.to_string_lossy().to_string()));
        let available = self.store.list_models()?;

        match ModelStore::current_selection(saved.as_deref(), loaded.as_deref(), &available) {
            Some(name) => self.select_model(&name).await.map(Some),
            None => {
                log::info!("No cached model to restore");
                Ok(None)
            }
        }
    }

    /// Build (or reuse) the session for `path` with the current runtime
    /// settings. A newer call cancels this one.
    pub async fn prepare_model(&self, path: &Path) -> Result<SessionInfo> {
        let plan = self.settings.inference_plan("", default_thread_count()).await;
        let ticket = self.tasks.begin(TaskKind::Prepare);
        let result = self
            .sessions
            .prepare_with_cancel(path, &plan.runtime, &ticket.cancel_token)
            .await;
        self.tasks.finish(&ticket);
        result
    }

    /// Run `prompt` against the selected model with the current settings
    pub async fn run_inference(&self, prompt: &str) -> Result<String> {
        let plan = self.settings.inference_plan(prompt, default_thread_count()).await;
        log::debug!(
            "Prompt ~{} tokens, generating up to {}",
            plan.budget.prompt_tokens,
            plan.budget.max_tokens
        );

        if let Some(path) = self.settings.snapshot().await.model_path {
            self.sessions.prepare(Path::new(&path), &plan.runtime).await?;
        }
        self.sessions.run(prompt, &plan.sampling).await
    }

    /// Cancel in-flight work and release the session. Only the first call
    /// does anything.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Shutting down");
        self.watch_cancel.cancel();
        self.tasks.cancel_all();
        self.sessions.release().await;
    }

    fn publish_final(&self, file_name: &str, status: DownloadStatus) {
        self.downloads.publish(DownloadProgress {
            file_name: file_name.to_string(),
            downloaded_bytes: 0,
            total_bytes: None,
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llama::session::tests::FakeEngine;
    use tempfile::{tempdir, TempDir};

    async fn state() -> (TempDir, Arc<FakeEngine>, CoreState) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let state = CoreState::open(CoreConfig::with_data_dir(dir.path().to_path_buf()), engine.clone())
            .await
            .unwrap();
        (dir, engine, state)
    }

    #[tokio::test]
    async fn test_open_sweeps_stale_downloads() {
        let dir = tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path().to_path_buf());
        std::fs::create_dir_all(config.models_dir()).unwrap();
        std::fs::write(config.models_dir().join("old-1234.download"), b"x").unwrap();

        let state = CoreState::open(config, Arc::new(FakeEngine::default())).await.unwrap();
        assert!(state.models().list_models().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(state.config().models_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_without_model_is_not_ready() {
        let (_dir, _engine, state) = state().await;
        assert_eq!(state.run_inference("hello").await.unwrap_err(), CoreError::NotReady);
    }

    #[tokio::test]
    async fn test_select_model_persists_and_prepares() {
        let (_dir, engine, state) = state().await;
        std::fs::write(state.config().models_dir().join("a.gguf"), b"GGUF").unwrap();

        let info = state.select_model("a.gguf").await.unwrap();
        assert_eq!(info.runtime_config.context_size, state.settings().snapshot().await.context_size);
        assert!(state.settings().snapshot().await.model_path.is_some());

        let reply = state.run_inference("hello").await.unwrap();
        assert_eq!(reply, "echo:hello");
        // Same settings, same file: the session was reused
        assert_eq!(engine.inits.lock().unwrap().len(), 1);

        let err = state.select_model("missing.gguf").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_restore_selection_prefers_saved_then_loaded_model() {
        let (_dir, _engine, state) = state().await;
        let models = state.config().models_dir();
        for name in ["a.gguf", "b.gguf"] {
            std::fs::write(models.join(name), b"GGUF").unwrap();
        }
        state.select_model("a.gguf").await.unwrap();

        let saved = models.join("b.gguf").to_string_lossy().to_string();
        state.settings().update_model_path(Some(saved.as_str())).await;
        let info = state.restore_selection().await.unwrap().unwrap();
        assert!(info.model_path.ends_with("b.gguf"));

        // Saved model gone from the cache: keep whatever is loaded
        let gone = models.join("gone.gguf").to_string_lossy().to_string();
        state.settings().update_model_path(Some(gone.as_str())).await;
        let info = state.restore_selection().await.unwrap().unwrap();
        assert!(info.model_path.ends_with("b.gguf"));
    }

    #[tokio::test]
    async fn test_restore_selection_without_saved_or_loaded_model() {
        let (_dir, _engine, state) = state().await;
        let preset_model = state.settings().snapshot().await.model;
        std::fs::write(state.config().models_dir().join(&preset_model), b"GGUF").unwrap();

        assert!(state.restore_selection().await.unwrap().is_none());
        assert!(!state.sessions().is_ready().await);
    }

    #[tokio::test]
    async fn test_shutdown_releases_once() {
        let (_dir, engine, state) = state().await;
        std::fs::write(state.config().models_dir().join("a.gguf"), b"GGUF").unwrap();
        state.select_model("a.gguf").await.unwrap();

        state.shutdown().await;
        state.shutdown().await;
        assert_eq!(engine.released.lock().unwrap().len(), 1);
        assert!(!state.sessions().is_ready().await);
    }
}
