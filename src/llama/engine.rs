//! Boundary to the native inference engine
//!
//! The engine loads a model file, runs completions and frees its resources.
//! Everything behind this trait (tokenization, sampling, GPU offload) is
//! opaque to the core.

use std::path::Path;

use async_trait::async_trait;

use super::config::{RuntimeConfig, SamplingConfig};
use crate::error::CoreError;

/// Opaque engine resource identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// Callback invoked for every generated token
pub type TokenCallback = Box<dyn Fn(String) + Send + Sync>;

#[async_trait]
pub trait Engine: Send + Sync {
    /// Load a model and allocate a context for it
    async fn init(&self, model_path: &Path, config: &RuntimeConfig) -> Result<EngineHandle, CoreError>;

    /// Generate a completion, reporting each token through `on_token`
    async fn complete(
        &self,
        handle: EngineHandle,
        prompt: &str,
        sampling: &SamplingConfig,
        on_token: TokenCallback,
    ) -> Result<String, CoreError>;

    /// Free the model and context behind `handle`
    async fn release(&self, handle: EngineHandle);

    /// `Some(true)` when GPU offload works, `Some(false)` when it does not,
    /// `None` when this build cannot tell
    fn is_acceleration_available(&self) -> Option<bool>;
}
