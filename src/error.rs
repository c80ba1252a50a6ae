//! Error taxonomy shared by every component of the core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the downloader, model store, session manager and
/// settings store adapter.
///
/// Configuration parse failures are deliberately absent: the parser degrades
/// to a fallback config instead of raising.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum CoreError {
    /// Caller supplied a bad URL, file name or count
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Network failure, timeout, non-retryable HTTP status or truncated body
    #[error("Transport error: {0}")]
    Transport(String),
    /// Inference requested before a session was prepared
    #[error("Model is not ready. Prepare a session first.")]
    NotReady,
    /// Error reported by the inference engine, passed through verbatim
    #[error("{0}")]
    Engine(String),
    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(String),
    /// Settings store failure
    #[error("Settings storage error: {0}")]
    Storage(String),
    /// The task was superseded or shut down
    #[error("Operation cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn io(context: &str, err: std::io::Error) -> Self {
        CoreError::Io(format!("{}: {}", context, err))
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Storage(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::Transport("status 404".to_string());
        assert_eq!(error.to_string(), "Transport error: status 404");
        assert_eq!(CoreError::Engine("boom".into()).to_string(), "boom");
    }

    #[test]
    fn test_anyhow_maps_to_storage() {
        let err: CoreError = anyhow::anyhow!("disk full").context("Failed to set setting").into();
        match err {
            CoreError::Storage(msg) => assert!(msg.contains("disk full")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
