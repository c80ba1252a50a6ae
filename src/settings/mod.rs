//! User settings
//!
//! - preset.rs: PresetOption, PresetValues, the preset/custom state machine
//! - types.rs: SettingsConfig, SettingEdit, persisted keys
//! - store.rs: SettingsStore boundary, SQLite implementation
//! - controller.rs: SettingsController

pub mod preset;
pub mod types;
pub mod store;
pub mod controller;

pub use preset::{PresetOption, PresetState, PresetValues};
pub use types::{keys, SettingEdit, SettingsConfig, StoredSettings};
pub use store::{SettingsStore, SqliteSettingsStore};
pub use controller::{InferencePlan, SettingsController};
