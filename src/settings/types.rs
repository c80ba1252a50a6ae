//! Persisted settings snapshot and field edits

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::preset::{PresetOption, PresetValues, BALANCED_VALUES};

/// Raw key -> value map as stored
pub type StoredSettings = BTreeMap<String, String>;

pub mod keys {
    pub const MODEL_PATH: &str = "model_path";
    pub const PRESET: &str = "preset_setting";
    pub const MODEL: &str = "model_setting";
    pub const RUNTIME: &str = "runtime_setting";
    pub const SAMPLING: &str = "sampling_setting";
    pub const PROMPT_PERSONA: &str = "prompt_persona_setting";
    pub const MEMORY: &str = "memory_setting";
    pub const CODING_WORKSPACE: &str = "coding_workspace_setting";
    pub const PRIVACY: &str = "privacy_setting";
    pub const STORAGE: &str = "storage_setting";
    pub const DIAGNOSTICS: &str = "diagnostics_setting";
    pub const CONTEXT_SIZE: &str = "context_size_setting";
    pub const N_GPU_LAYERS: &str = "n_gpu_layers_setting";
    pub const BATCH_SIZE: &str = "batch_size_setting";
    pub const TEMPERATURE: &str = "temperature_setting";
    pub const TOP_P: &str = "top_p_setting";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsConfig {
    pub model_path: Option<String>,
    pub preset: PresetOption,
    pub model: String,
    pub runtime: String,
    pub sampling: String,
    pub prompt_persona: String,
    pub memory: String,
    pub coding_workspace: String,
    pub privacy: String,
    pub storage: String,
    pub diagnostics: String,
    pub context_size: i32,
    pub n_gpu_layers: i32,
    pub batch_size: i32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self::from_preset(PresetOption::Balanced, &BALANCED_VALUES)
    }
}

impl SettingsConfig {
    fn from_preset(preset: PresetOption, values: &PresetValues) -> Self {
        let mut config = Self {
            model_path: None,
            preset,
            model: String::new(),
            runtime: String::new(),
            sampling: String::new(),
            prompt_persona: String::new(),
            memory: String::new(),
            coding_workspace: String::new(),
            privacy: String::new(),
            storage: String::new(),
            diagnostics: String::new(),
            context_size: 0,
            n_gpu_layers: 0,
            batch_size: 0,
            temperature: 0.0,
            top_p: 0.0,
        };
        config.apply_preset_values(values);
        config
    }

    /// Overwrite every bundled field. The preset tag is left alone.
    pub fn apply_preset_values(&mut self, values: &PresetValues) {
        self.model = values.model.to_string();
        self.runtime = values.runtime.to_string();
        self.sampling = values.sampling.to_string();
        self.prompt_persona = values.prompt_persona.to_string();
        self.memory = values.memory.to_string();
        self.coding_workspace = values.coding_workspace.to_string();
        self.privacy = values.privacy.to_string();
        self.storage = values.storage.to_string();
        self.diagnostics = values.diagnostics.to_string();
        self.context_size = values.context_size;
        self.n_gpu_layers = values.n_gpu_layers;
        self.batch_size = values.batch_size;
        self.temperature = values.temperature;
        self.top_p = values.top_p;
    }

    /// Edits that write every bundled field, in persisted form
    pub fn bundled_edits(&self) -> Vec<SettingEdit> {
        vec![
            SettingEdit::Model(self.model.clone()),
            SettingEdit::Runtime(self.runtime.clone()),
            SettingEdit::Sampling(self.sampling.clone()),
            SettingEdit::PromptPersona(self.prompt_persona.clone()),
            SettingEdit::Memory(self.memory.clone()),
            SettingEdit::CodingWorkspace(self.coding_workspace.clone()),
            SettingEdit::Privacy(self.privacy.clone()),
            SettingEdit::Storage(self.storage.clone()),
            SettingEdit::Diagnostics(self.diagnostics.clone()),
            SettingEdit::ContextSize(self.context_size),
            SettingEdit::NGpuLayers(self.n_gpu_layers),
            SettingEdit::BatchSize(self.batch_size),
            SettingEdit::Temperature(self.temperature),
            SettingEdit::TopP(self.top_p),
        ]
    }

    /// Build from a stored map. Missing or unparsable values fall back to
    /// `defaults`; the preset tag goes through `PresetOption::from_id`.
    pub fn from_stored(stored: &StoredSettings, defaults: &SettingsConfig) -> Self {
        let text = |key: &str, default: &String| stored.get(key).cloned().unwrap_or_else(|| default.clone());

        Self {
            model_path: stored
                .get(keys::MODEL_PATH)
                .filter(|p| !p.trim().is_empty())
                .cloned(),
            preset: PresetOption::from_id(stored.get(keys::PRESET).map(String::as_str)),
            model: text(keys::MODEL, &defaults.model),
            runtime: text(keys::RUNTIME, &defaults.runtime),
            sampling: text(keys::SAMPLING, &defaults.sampling),
            prompt_persona: text(keys::PROMPT_PERSONA, &defaults.prompt_persona),
            memory: text(keys::MEMORY, &defaults.memory),
            coding_workspace: text(keys::CODING_WORKSPACE, &defaults.coding_workspace),
            privacy: text(keys::PRIVACY, &defaults.privacy),
            storage: text(keys::STORAGE, &defaults.storage),
            diagnostics: text(keys::DIAGNOSTICS, &defaults.diagnostics),
            context_size: parse_or(stored, keys::CONTEXT_SIZE, defaults.context_size),
            n_gpu_layers: parse_or(stored, keys::N_GPU_LAYERS, defaults.n_gpu_layers),
            batch_size: parse_or(stored, keys::BATCH_SIZE, defaults.batch_size),
            temperature: parse_or(stored, keys::TEMPERATURE, defaults.temperature),
            top_p: parse_or(stored, keys::TOP_P, defaults.top_p),
        }
    }
}

fn parse_or<T: FromStr + Copy>(stored: &StoredSettings, key: &str, default: T) -> T {
    match stored.get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable value {:?} for {}", raw, key);
            default
        }),
        None => default,
    }
}

/// One edit of a bundled settings field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum SettingEdit {
    Model(String),
    Runtime(String),
    Sampling(String),
    PromptPersona(String),
    Memory(String),
    CodingWorkspace(String),
    Privacy(String),
    Storage(String),
    Diagnostics(String),
    ContextSize(i32),
    NGpuLayers(i32),
    BatchSize(i32),
    Temperature(f32),
    TopP(f32),
}

impl SettingEdit {
    pub fn key(&self) -> &'static str {
        match self {
            SettingEdit::Model(_) => keys::MODEL,
            SettingEdit::Runtime(_) => keys::RUNTIME,
            SettingEdit::Sampling(_) => keys::SAMPLING,
            SettingEdit::PromptPersona(_) => keys::PROMPT_PERSONA,
            SettingEdit::Memory(_) => keys::MEMORY,
            SettingEdit::CodingWorkspace(_) => keys::CODING_WORKSPACE,
            SettingEdit::Privacy(_) => keys::PRIVACY,
            SettingEdit::Storage(_) => keys::STORAGE,
            SettingEdit::Diagnostics(_) => keys::DIAGNOSTICS,
            SettingEdit::ContextSize(_) => keys::CONTEXT_SIZE,
            SettingEdit::NGpuLayers(_) => keys::N_GPU_LAYERS,
            SettingEdit::BatchSize(_) => keys::BATCH_SIZE,
            SettingEdit::Temperature(_) => keys::TEMPERATURE,
            SettingEdit::TopP(_) => keys::TOP_P,
        }
    }

    /// Value in persisted text form
    pub fn encoded(&self) -> String {
        match self {
            SettingEdit::Model(v)
            | SettingEdit::Runtime(v)
            | SettingEdit::Sampling(v)
            | SettingEdit::PromptPersona(v)
            | SettingEdit::Memory(v)
            | SettingEdit::CodingWorkspace(v)
            | SettingEdit::Privacy(v)
            | SettingEdit::Storage(v)
            | SettingEdit::Diagnostics(v) => v.clone(),
            SettingEdit::ContextSize(v) | SettingEdit::NGpuLayers(v) | SettingEdit::BatchSize(v) => v.to_string(),
            SettingEdit::Temperature(v) | SettingEdit::TopP(v) => v.to_string(),
        }
    }

    /// Apply to `config`; returns false when the field already held this value
    pub fn apply(&self, config: &mut SettingsConfig) -> bool {
        fn set<T: PartialEq + Clone>(slot: &mut T, value: &T) -> bool {
            if slot == value {
                return false;
            }
            *slot = value.clone();
            true
        }

        match self {
            SettingEdit::Model(v) => set(&mut config.model, v),
            SettingEdit::Runtime(v) => set(&mut config.runtime, v),
            SettingEdit::Sampling(v) => set(&mut config.sampling, v),
            SettingEdit::PromptPersona(v) => set(&mut config.prompt_persona, v),
            SettingEdit::Memory(v) => set(&mut config.memory, v),
            SettingEdit::CodingWorkspace(v) => set(&mut config.coding_workspace, v),
            SettingEdit::Privacy(v) => set(&mut config.privacy, v),
            SettingEdit::Storage(v) => set(&mut config.storage, v),
            SettingEdit::Diagnostics(v) => set(&mut config.diagnostics, v),
            SettingEdit::ContextSize(v) => set(&mut config.context_size, v),
            SettingEdit::NGpuLayers(v) => set(&mut config.n_gpu_layers, v),
            SettingEdit::BatchSize(v) => set(&mut config.batch_size, v),
            SettingEdit::Temperature(v) => set(&mut config.temperature, v),
            SettingEdit::TopP(v) => set(&mut config.top_p, v),
        }
    }
}
