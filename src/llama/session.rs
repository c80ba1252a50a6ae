//! Ownership of the single live inference session
//!
//! The raw engine handle never leaves this module. Every prepare/release runs
//! on a spawned task holding the session lock, so a caller that gives up
//! halfway (dropped future, cancelled token) cannot leave a handle half
//! released or leaked.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use super::config::{RuntimeConfig, SamplingConfig};
use super::engine::{Engine, EngineHandle, TokenCallback};
use crate::error::{CoreError, Result};
use crate::progress::ProgressChannel;

struct Session {
    handle: EngineHandle,
    model_path: PathBuf,
    runtime_config: RuntimeConfig,
}

impl Session {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            model_path: self.model_path.clone(),
            runtime_config: self.runtime_config.clone(),
        }
    }
}

/// Public view of the active session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub model_path: PathBuf,
    pub runtime_config: RuntimeConfig,
}

pub struct SessionManager {
    engine: Arc<dyn Engine>,
    session: Arc<Mutex<Option<Session>>>,
    tokens: ProgressChannel<String>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            session: Arc::new(Mutex::new(None)),
            tokens: ProgressChannel::new(),
        }
    }

    /// Tokens generated by `run`, as they arrive
    pub fn subscribe_tokens(&self) -> broadcast::Receiver<String> {
        self.tokens.subscribe()
    }

    pub fn acceleration(&self) -> Option<bool> {
        self.engine.is_acceleration_available()
    }

    pub async fn current(&self) -> Option<SessionInfo> {
        self.session.lock().await.as_ref().map(Session::info)
    }

    pub async fn is_ready(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn prepare(&self, model_path: &Path, runtime_config: &RuntimeConfig) -> Result<SessionInfo> {
        self.prepare_with_cancel(model_path, runtime_config, &CancellationToken::new())
            .await
    }

    /// Reuse the current session when model and config are unchanged and the
    /// file is still on disk; otherwise release it and build a new one.
    pub async fn prepare_with_cancel(
        &self,
        model_path: &Path,
        runtime_config: &RuntimeConfig,
        cancel: &CancellationToken,
    ) -> Result<SessionInfo> {
        let engine = Arc::clone(&self.engine);
        let slot = Arc::clone(&self.session);
        let model_path = normalize_path(model_path);
        let config = runtime_config.sanitized();
        let cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut guard = slot.lock_owned().await;

            if let Some(current) = guard.as_ref() {
                if current.model_path == model_path
                    && current.runtime_config == config
                    && model_path.exists()
                {
                    log::debug!("Reusing session for {}", model_path.display());
                    return Ok(current.info());
                }
            }

            if let Some(old) = guard.take() {
                log::info!("Releasing session for {}", old.model_path.display());
                engine.release(old.handle).await;
            }

            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            if !model_path.is_file() {
                return Err(CoreError::InvalidArgument(format!(
                    "Model file not found: {}",
                    model_path.display()
                )));
            }

            log::info!(
                "Loading {} (threads={}, context={})",
                model_path.display(),
                config.thread_count,
                config.context_size
            );
            let handle = engine.init(&model_path, &config).await?;

            if cancel.is_cancelled() {
                engine.release(handle).await;
                return Err(CoreError::Cancelled);
            }

            let session = Session {
                handle,
                model_path,
                runtime_config: config,
            };
            let info = session.info();
            *guard = Some(session);
            Ok(info)
        });

        task.await
            .map_err(|e| CoreError::Engine(format!("Session task failed: {}", e)))?
    }

    /// Run a completion on the active session, streaming tokens to observers.
    pub async fn run(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(CoreError::NotReady)?;

        let tokens = self.tokens.clone();
        let on_token: TokenCallback = Box::new(move |token| tokens.publish(token));

        self.engine
            .complete(session.handle, prompt, &sampling.sanitized(), on_token)
            .await
    }

    /// Release the active session, if any. Safe to call repeatedly.
    pub async fn release(&self) {
        let engine = Arc::clone(&self.engine);
        let slot = Arc::clone(&self.session);
        let task = tokio::spawn(async move {
            let mut guard = slot.lock_owned().await;
            if let Some(old) = guard.take() {
                log::info!("Releasing session for {}", old.model_path.display());
                engine.release(old.handle).await;
            }
        });
        if let Err(e) = task.await {
            log::warn!("Session release task failed: {}", e);
        }
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use async_trait::async_trait;
    use tempfile::tempdir;

    /// Engine double recording every init/release
    #[derive(Default)]
    pub(crate) struct FakeEngine {
        next_handle: AtomicU64,
        pub inits: StdMutex<Vec<(PathBuf, RuntimeConfig)>>,
        pub released: StdMutex<Vec<EngineHandle>>,
        pub fail_init: StdMutex<Option<String>>,
    }

    #[async_trait]
    impl Engine for FakeEngine {
        async fn init(&self, model_path: &Path, config: &RuntimeConfig) -> Result<EngineHandle> {
            if let Some(msg) = self.fail_init.lock().unwrap().clone() {
                return Err(CoreError::Engine(msg));
            }
            self.inits.lock().unwrap().push((model_path.to_path_buf(), config.clone()));
            Ok(EngineHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1))
        }

        async fn complete(
            &self,
            _handle: EngineHandle,
            prompt: &str,
            sampling: &SamplingConfig,
            on_token: TokenCallback,
        ) -> Result<String> {
            let pieces = vec!["echo:".to_string(), prompt.to_string()];
            let mut out = String::new();
            for piece in pieces.into_iter().take(sampling.max_tokens.max(0) as usize) {
                on_token(piece.clone());
                out.push_str(&piece);
            }
            Ok(out)
        }

        async fn release(&self, handle: EngineHandle) {
            self.released.lock().unwrap().push(handle);
        }

        fn is_acceleration_available(&self) -> Option<bool> {
            None
        }
    }

    fn model_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"GGUF").unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_without_session_is_not_ready() {
        let manager = SessionManager::new(Arc::new(FakeEngine::default()));
        let err = manager.run("hi", &SamplingConfig::with_defaults(8)).await.unwrap_err();
        assert_eq!(err, CoreError::NotReady);
    }

    #[tokio::test]
    async fn test_prepare_reuses_matching_session() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        let manager = SessionManager::new(engine.clone());
        let config = RuntimeConfig::with_defaults(4, 2048);

        manager.prepare(&path, &config).await.unwrap();
        manager.prepare(&path, &config).await.unwrap();

        assert_eq!(engine.inits.lock().unwrap().len(), 1);
        assert!(engine.released.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_rebuilds_on_config_change() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        let manager = SessionManager::new(engine.clone());

        manager.prepare(&path, &RuntimeConfig::with_defaults(4, 2048)).await.unwrap();
        let info = manager.prepare(&path, &RuntimeConfig::with_defaults(4, 4096)).await.unwrap();

        assert_eq!(info.runtime_config.context_size, 4096);
        assert_eq!(engine.inits.lock().unwrap().len(), 2);
        assert_eq!(*engine.released.lock().unwrap(), vec![EngineHandle(1)]);
    }

    #[tokio::test]
    async fn test_prepare_hands_sanitized_config_to_engine() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        let manager = SessionManager::new(engine.clone());
        let raw = RuntimeConfig {
            n_gpu_layers: Some(-1),
            ..RuntimeConfig::with_defaults(2, 512)
        };

        manager.prepare(&path, &raw).await.unwrap();
        manager.prepare(&path, &raw).await.unwrap();

        let inits = engine.inits.lock().unwrap();
        assert_eq!(inits.len(), 1);
        assert_eq!(inits[0].1.n_gpu_layers, None);
    }

    #[tokio::test]
    async fn test_missing_file_releases_stale_session() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        let manager = SessionManager::new(engine.clone());
        let config = RuntimeConfig::with_defaults(4, 2048);

        manager.prepare(&path, &config).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = manager.prepare(&path, &config).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert!(!manager.is_ready().await);
        assert_eq!(engine.released.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_error_is_surfaced_verbatim() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        *engine.fail_init.lock().unwrap() = Some("unsupported model arch".to_string());
        let manager = SessionManager::new(engine.clone());

        let err = manager
            .prepare(&path, &RuntimeConfig::with_defaults(1, 64))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported model arch");
    }

    #[tokio::test]
    async fn test_run_streams_tokens() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let manager = SessionManager::new(Arc::new(FakeEngine::default()));
        manager.prepare(&path, &RuntimeConfig::with_defaults(1, 64)).await.unwrap();

        let mut rx = manager.subscribe_tokens();
        let text = manager.run("ping", &SamplingConfig::with_defaults(8)).await.unwrap();

        assert_eq!(text, "echo:ping");
        assert_eq!(rx.recv().await.unwrap(), "echo:");
        assert_eq!(rx.recv().await.unwrap(), "ping");
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        let manager = SessionManager::new(engine.clone());
        manager.prepare(&path, &RuntimeConfig::with_defaults(1, 64)).await.unwrap();

        manager.release().await;
        manager.release().await;

        assert_eq!(engine.released.lock().unwrap().len(), 1);
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_prepare_leaves_manager_empty() {
        let dir = tempdir().unwrap();
        let path = model_file(dir.path(), "a.gguf");
        let engine = Arc::new(FakeEngine::default());
        let manager = SessionManager::new(engine.clone());
        manager.prepare(&path, &RuntimeConfig::with_defaults(1, 64)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = manager
            .prepare_with_cancel(&path, &RuntimeConfig::with_defaults(2, 64), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, CoreError::Cancelled);
        assert!(!manager.is_ready().await);
        assert_eq!(engine.released.lock().unwrap().len(), 1);
        assert_eq!(engine.inits.lock().unwrap().len(), 1);
    }
}
