//! llama runtime integration
//!
//! - config.rs: RuntimeConfig / SamplingConfig and their sanitization
//! - parser.rs: settings text -> typed configs
//! - engine.rs: native engine boundary
//! - session.rs: SessionManager owning the single live session

pub mod config;
pub mod parser;
pub mod engine;
pub mod session;

pub use config::{RuntimeConfig, SamplingConfig};
pub use parser::{parse_runtime_config, parse_sampling_config, FallbackReason, ParseOutcome};
pub use engine::{Engine, EngineHandle, TokenCallback};
pub use session::{SessionInfo, SessionManager};
