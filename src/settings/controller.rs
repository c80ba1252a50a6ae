//! Settings Controller
//!
//! Single owner of the in-memory `SettingsConfig`. Every mutation runs under
//! one lock and is persisted before the lock is released, so edits reach the
//! store in the order they were made. Store failures are logged; the
//! in-memory state still advances.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::preset::{PresetOption, PresetState};
use super::store::SettingsStore;
use super::types::{keys, SettingEdit, SettingsConfig, StoredSettings};
use crate::llama::{parse_runtime_config, parse_sampling_config, RuntimeConfig, SamplingConfig};
use crate::token_budget::{compute_token_budget, derive_default_max_tokens, TokenBudget};

/// Everything one inference request needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferencePlan {
    pub runtime: RuntimeConfig,
    pub sampling: SamplingConfig,
    pub budget: TokenBudget,
}

pub struct SettingsController {
    store: Arc<dyn SettingsStore>,
    defaults: SettingsConfig,
    state: Mutex<SettingsConfig>,
    updates: watch::Sender<SettingsConfig>,
}

impl SettingsController {
    /// Load the persisted snapshot and reconcile it
    pub async fn load(store: Arc<dyn SettingsStore>) -> Self {
        let defaults = SettingsConfig::default();
        let (updates, _) = watch::channel(defaults.clone());
        let controller = Self {
            store,
            state: Mutex::new(defaults.clone()),
            defaults,
            updates,
        };

        let stored = match controller.store.read().await {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Failed to read settings, using defaults: {}", e);
                StoredSettings::new()
            }
        };
        controller.reconcile(&stored).await;
        controller
    }

    pub async fn snapshot(&self) -> SettingsConfig {
        self.state.lock().await.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsConfig> {
        self.updates.subscribe()
    }

    pub async fn select_preset(&self, preset: PresetOption) {
        let mut state = self.state.lock().await;
        if state.preset == preset {
            return;
        }

        state.preset = PresetState::from(state.preset).on_preset_selected(preset).option();
        let mut entries = vec![(keys::PRESET.to_string(), Some(preset.id().to_string()))];
        if let Some(values) = preset.values() {
            state.apply_preset_values(values);
            entries.extend(
                state
                    .bundled_edits()
                    .iter()
                    .map(|edit| (edit.key().to_string(), Some(edit.encoded()))),
            );
        }

        log::info!("Preset changed to {}", preset.id());
        self.persist(entries).await;
        self.publish(&state);
    }

    /// Set one bundled field. Leaves any named preset for `Custom`; the
    /// preset tag and the field are written in one transaction.
    pub async fn edit_field(&self, edit: SettingEdit) {
        let mut state = self.state.lock().await;
        if !edit.apply(&mut state) {
            return;
        }

        let mut entries = Vec::with_capacity(2);
        let next = PresetState::from(state.preset).on_field_edited().option();
        if next != state.preset {
            log::debug!("{} edited, preset {} -> {}", edit.key(), state.preset.id(), next.id());
            state.preset = next;
            entries.push((keys::PRESET.to_string(), Some(next.id().to_string())));
        }
        entries.push((edit.key().to_string(), Some(edit.encoded())));

        self.persist(entries).await;
        self.publish(&state);
    }

    /// Persist the selected model path; blank clears it
    pub async fn update_model_path(&self, path: Option<&str>) {
        let path = path.map(str::trim).filter(|p| !p.is_empty()).map(str::to_string);
        let mut state = self.state.lock().await;
        if state.model_path == path {
            return;
        }
        state.model_path = path.clone();
        self.persist(vec![(keys::MODEL_PATH.to_string(), path)]).await;
        self.publish(&state);
    }

    pub async fn clear_model_path(&self) {
        self.update_model_path(None).await;
    }

    /// Replace the in-memory state with `stored`, dropping a `model_path`
    /// whose file is gone.
    pub async fn reconcile(&self, stored: &StoredSettings) -> SettingsConfig {
        let mut state = self.state.lock().await;
        self.reconcile_locked(&mut state, stored).await
    }

    async fn reconcile_locked(&self, state: &mut SettingsConfig, stored: &StoredSettings) -> SettingsConfig {
        let mut config = SettingsConfig::from_stored(stored, &self.defaults);

        let stale_path = config
            .model_path
            .as_deref()
            .is_some_and(|p| !Path::new(p).is_file());
        if stale_path {
            log::info!("Saved model {:?} no longer exists, clearing it", config.model_path);
            config.model_path = None;
        }

        *state = config.clone();
        if stale_path {
            self.persist(vec![(keys::MODEL_PATH.to_string(), None)]).await;
        }
        self.publish(state);
        config
    }

    /// Reconcile on every snapshot the store publishes until `cancel` fires.
    ///
    /// The snapshot is read with the state lock held; writers persist under
    /// the same lock.
    pub fn spawn_watch(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let mut state = self.state.lock().await;
                        let stored = rx.borrow_and_update().clone();
                        self.reconcile_locked(&mut state, &stored).await;
                    }
                }
            }
            log::debug!("Settings watch stopped");
        })
    }

    /// Runtime and sampling configs for `prompt`, with the numeric knobs
    /// laid over the parsed text and `max_tokens` clamped to the budget.
    pub async fn inference_plan(&self, prompt: &str, fallback_threads: i32) -> InferencePlan {
        let config = self.snapshot().await;

        let mut runtime = parse_runtime_config(&config.runtime, fallback_threads, config.context_size);
        if config.context_size > 0 {
            runtime.context_size = config.context_size;
        }
        runtime.n_gpu_layers = Some(config.n_gpu_layers);
        runtime.batch_size = Some(config.batch_size);
        let runtime = runtime.sanitized();

        let mut sampling = parse_sampling_config(&config.sampling, derive_default_max_tokens(runtime.context_size));
        sampling.temperature = Some(config.temperature);
        sampling.top_p = Some(config.top_p);
        let mut sampling = sampling.sanitized();

        let budget = compute_token_budget(prompt, runtime.context_size, sampling.max_tokens);
        sampling.max_tokens = budget.max_tokens;

        InferencePlan { runtime, sampling, budget }
    }

    async fn persist(&self, entries: Vec<(String, Option<String>)>) {
        if let Err(e) = self.store.write_all(entries).await {
            log::warn!("Failed to persist settings: {}", e);
        }
    }

    fn publish(&self, state: &SettingsConfig) {
        self.updates.send_replace(state.clone());
    }
}
