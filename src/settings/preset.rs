//! Named presets and the preset/custom state machine

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetOption {
    BatterySaver,
    Balanced,
    Turbo,
    Custom,
}

impl PresetOption {
    pub const ALL: [PresetOption; 4] = [
        PresetOption::BatterySaver,
        PresetOption::Balanced,
        PresetOption::Turbo,
        PresetOption::Custom,
    ];

    /// Stable id used as the persisted tag
    pub fn id(&self) -> &'static str {
        match self {
            PresetOption::BatterySaver => "battery_saver",
            PresetOption::Balanced => "balanced",
            PresetOption::Turbo => "turbo",
            PresetOption::Custom => "custom",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PresetOption::BatterySaver => "Small context and CPU only inference to save battery.",
            PresetOption::Balanced => "Moderate context with partial GPU offload.",
            PresetOption::Turbo => "Large context with full GPU offload for the fastest replies.",
            PresetOption::Custom => "Values edited by hand.",
        }
    }

    /// Parse a stored tag. Accepts legacy spellings; blank or unknown tags
    /// become `Balanced`.
    pub fn from_id(value: Option<&str>) -> Self {
        let normalized = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_lowercase(),
            _ => return PresetOption::Balanced,
        };

        if let Some(option) = Self::ALL.iter().find(|o| o.id() == normalized) {
            return *option;
        }

        match normalized.as_str() {
            "battery" | "battery saver" | "hemat baterai" => PresetOption::BatterySaver,
            "pro" => PresetOption::Turbo,
            "default" | "preset default" => PresetOption::Balanced,
            _ => PresetOption::Balanced,
        }
    }

    /// Bundled values; `None` for `Custom`
    pub fn values(&self) -> Option<&'static PresetValues> {
        match self {
            PresetOption::BatterySaver => Some(&BATTERY_SAVER_VALUES),
            PresetOption::Balanced => Some(&BALANCED_VALUES),
            PresetOption::Turbo => Some(&TURBO_VALUES),
            PresetOption::Custom => None,
        }
    }
}

/// Every field a named preset overwrites
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetValues {
    pub model: &'static str,
    pub runtime: &'static str,
    pub sampling: &'static str,
    pub prompt_persona: &'static str,
    pub memory: &'static str,
    pub coding_workspace: &'static str,
    pub privacy: &'static str,
    pub storage: &'static str,
    pub diagnostics: &'static str,
    pub context_size: i32,
    pub n_gpu_layers: i32,
    pub batch_size: i32,
    pub temperature: f32,
    pub top_p: f32,
}

pub const BATTERY_SAVER_VALUES: PresetValues = PresetValues {
    model: "Llama-3.2-1B-Instruct-Q4_K_M.gguf",
    runtime: r#"{"threads":"auto","context_size":1024,"n_gpu_layers":0,"batch":128,"use_mmap":true}"#,
    sampling: r#"{"max_tokens":256,"temperature":0.6,"top_p":0.85,"top_k":40,"repeat_penalty":1.1}"#,
    prompt_persona: "Concise assistant",
    memory: "Keep the last 4 turns",
    coding_workspace: "Disabled",
    privacy: "Offline only",
    storage: "Delete unused models automatically",
    diagnostics: "Errors only",
    context_size: 1024,
    n_gpu_layers: 0,
    batch_size: 128,
    temperature: 0.6,
    top_p: 0.85,
};

pub const BALANCED_VALUES: PresetValues = PresetValues {
    model: "Llama-3.2-3B-Instruct-Q4_K_M.gguf",
    runtime: r#"{"threads":"auto","context_size":2048,"n_gpu_layers":16,"batch":256,"use_mmap":true}"#,
    sampling: r#"{"max_tokens":512,"temperature":0.7,"top_p":0.9,"top_k":40,"repeat_penalty":1.1}"#,
    prompt_persona: "Helpful assistant",
    memory: "Keep the last 8 turns",
    coding_workspace: "Read only",
    privacy: "Offline only",
    storage: "Keep downloaded models",
    diagnostics: "Warnings and errors",
    context_size: 2048,
    n_gpu_layers: 16,
    batch_size: 256,
    temperature: 0.7,
    top_p: 0.9,
};

pub const TURBO_VALUES: PresetValues = PresetValues {
    model: "Phi-4-mini-instruct-Q4_K_M.gguf",
    runtime: r#"{"threads":"auto","context_size":4096,"n_gpu_layers":99,"batch":512,"flash_attn":"auto","use_mmap":true}"#,
    sampling: r#"{"max_tokens":1024,"temperature":0.8,"top_p":0.95,"top_k":64,"repeat_penalty":1.05}"#,
    prompt_persona: "Detailed assistant",
    memory: "Keep the last 16 turns",
    coding_workspace: "Read and write",
    privacy: "Offline only",
    storage: "Keep downloaded models",
    diagnostics: "Verbose",
    context_size: 4096,
    n_gpu_layers: 99,
    batch_size: 512,
    temperature: 0.8,
    top_p: 0.95,
};

/// Two-state view of the preset tag.
///
/// `Named` never wraps `PresetOption::Custom`; build it through `From`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetState {
    Named(PresetOption),
    Custom,
}

impl From<PresetOption> for PresetState {
    fn from(option: PresetOption) -> Self {
        match option {
            PresetOption::Custom => PresetState::Custom,
            named => PresetState::Named(named),
        }
    }
}

impl PresetState {
    pub fn option(&self) -> PresetOption {
        match self {
            PresetState::Named(option) => *option,
            PresetState::Custom => PresetOption::Custom,
        }
    }

    /// Any hand edit of a bundled field leaves the named preset
    pub fn on_field_edited(self) -> Self {
        PresetState::Custom
    }

    pub fn on_preset_selected(self, option: PresetOption) -> Self {
        PresetState::from(option)
    }
}
