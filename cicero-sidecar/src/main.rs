//! Cicero Sidecar Binary
//!
//! Exposes model management, settings and token budgeting to an
//! out-of-process front end via JSON-RPC over stdin/stdout.
//!
//! One request per line in, one response per line out. `download` also
//! streams `{"progress": ...}` lines carrying the request id before its
//! final response.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use cicero_core::database::DatabaseManager;
use cicero_core::model_manager::{resolve_file_name, standard_models, ModelDownloader, ModelStore};
use cicero_core::settings::{SettingsStore, SqliteSettingsStore};
use cicero_core::{compute_token_budget, CoreConfig, PresetOption, SettingEdit, SettingsController};

const DATA_DIR_ENV: &str = "CICERO_DATA_DIR";

// ============================================================================
// JSON-RPC Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: u64,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: u64, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

/// Write one line to stdout
fn emit(response: &JsonRpcResponse) {
    let line = match serde_json::to_string(response) {
        Ok(line) => line,
        Err(e) => {
            log::error!("Failed to serialize response: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", line) {
        log::error!("Failed to write response: {}", e);
    }
    let _ = handle.flush();
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DownloadParams {
    url: String,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelNameParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SelectPresetParams {
    preset: String,
}

#[derive(Debug, Deserialize)]
struct TokenBudgetParams {
    prompt: String,
    context_size: i32,
    max_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct InferencePlanParams {
    prompt: String,
    #[serde(default = "default_threads")]
    threads: i32,
}

fn default_threads() -> i32 {
    cicero_core::config::default_thread_count()
}

// ============================================================================
// Sidecar State
// ============================================================================

struct SidecarState {
    store: ModelStore,
    downloader: ModelDownloader,
    settings: SettingsController,
}

type SharedState = Arc<SidecarState>;

impl SidecarState {
    async fn open(config: CoreConfig) -> Result<Self> {
        let store = ModelStore::new(config.models_dir());
        store.ensure_dir()?;
        let removed = store.sweep_temp_files()?;
        if removed > 0 {
            log::info!("Removed {} stale download file(s)", removed);
        }

        let downloader = ModelDownloader::new(store.clone(), config.downloader.clone())?;
        let db = Arc::new(DatabaseManager::new(config.database_path())?);
        let settings_store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(db)?);
        let settings = SettingsController::load(settings_store).await;

        Ok(Self { store, downloader, settings })
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn handle_list_models(state: SharedState) -> Result<serde_json::Value> {
    let models = state.store.local_models_info()?;
    Ok(serde_json::json!({ "models": models }))
}

async fn handle_download(state: SharedState, params: DownloadParams, request_id: u64) -> Result<serde_json::Value> {
    let file_name = params
        .file_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| resolve_file_name(&params.url));

    let path = state
        .downloader
        .download(
            &params.url,
            &file_name,
            |downloaded, total| {
                emit(&JsonRpcResponse::success(
                    request_id,
                    serde_json::json!({ "progress": { "downloaded": downloaded, "total": total } }),
                ));
            },
            |message| {
                emit(&JsonRpcResponse::success(
                    request_id,
                    serde_json::json!({ "status": message }),
                ));
            },
        )
        .await?;

    let path_str = path.to_string_lossy().to_string();
    state.settings.update_model_path(Some(path_str.as_str())).await;

    Ok(serde_json::json!({ "done": true, "path": path }))
}

async fn handle_delete_model(state: SharedState, params: ModelNameParams) -> Result<serde_json::Value> {
    let selected = state.settings.snapshot().await.model_path;
    let removed_path = state.store.remove(&params.name)?;

    if selected.as_deref().map(PathBuf::from) == Some(removed_path) {
        state.settings.clear_model_path().await;
    }
    Ok(serde_json::json!({ "success": true }))
}

async fn handle_select_preset(state: SharedState, params: SelectPresetParams) -> Result<serde_json::Value> {
    state
        .settings
        .select_preset(PresetOption::from_id(Some(&params.preset)))
        .await;
    Ok(serde_json::to_value(state.settings.snapshot().await)?)
}

async fn handle_edit_field(state: SharedState, edit: SettingEdit) -> Result<serde_json::Value> {
    state.settings.edit_field(edit).await;
    Ok(serde_json::to_value(state.settings.snapshot().await)?)
}

async fn handle_inference_plan(state: SharedState, params: InferencePlanParams) -> Result<serde_json::Value> {
    let plan = state.settings.inference_plan(&params.prompt, params.threads).await;
    Ok(serde_json::to_value(plan)?)
}

// ============================================================================
// Main Loop
// ============================================================================

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| anyhow!("Invalid params: {}", e))
}

async fn process_request(state: SharedState, request: JsonRpcRequest) -> JsonRpcResponse {
    let result = match request.method.as_str() {
        "catalog" => Ok(serde_json::json!({ "models": standard_models() })),
        "list_models" => handle_list_models(state).await,
        "download" => match parse_params(request.params) {
            Ok(params) => handle_download(state, params, request.id).await,
            Err(e) => Err(e),
        },
        "delete_model" => match parse_params(request.params) {
            Ok(params) => handle_delete_model(state, params).await,
            Err(e) => Err(e),
        },
        "settings" => serde_json::to_value(state.settings.snapshot().await).map_err(Into::into),
        "select_preset" => match parse_params(request.params) {
            Ok(params) => handle_select_preset(state, params).await,
            Err(e) => Err(e),
        },
        "edit_field" => match parse_params(request.params) {
            Ok(edit) => handle_edit_field(state, edit).await,
            Err(e) => Err(e),
        },
        "token_budget" => parse_params::<TokenBudgetParams>(request.params).and_then(|p| {
            Ok(serde_json::to_value(compute_token_budget(&p.prompt, p.context_size, p.max_tokens))?)
        }),
        "inference_plan" => match parse_params(request.params) {
            Ok(params) => handle_inference_plan(state, params).await,
            Err(e) => Err(e),
        },
        _ => Err(anyhow!("Unknown method: {}", request.method)),
    };

    match result {
        Ok(value) => JsonRpcResponse::success(request.id, value),
        Err(e) => JsonRpcResponse::error(request.id, -32000, e.to_string()),
    }
}

fn load_config() -> CoreConfig {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) => CoreConfig::with_data_dir(PathBuf::from(dir)),
        None => CoreConfig::default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON-RPC, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cicero_sidecar=info,cicero_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config();
    log::info!("Cicero sidecar starting (data dir {})", config.data_dir.display());
    let state: SharedState = Arc::new(SidecarState::open(config).await?);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("Failed to read line: {}", e);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                log::error!("Failed to parse request: {}", e);
                emit(&JsonRpcResponse::error(0, -32700, format!("Parse error: {}", e)));
                continue;
            }
        };

        log::debug!("Received request: {} (id={})", request.method, request.id);
        if request.method == "shutdown" {
            emit(&JsonRpcResponse::success(request.id, serde_json::json!({ "success": true })));
            break;
        }

        let response = process_request(state.clone(), request).await;
        emit(&response);
    }

    log::info!("Cicero sidecar shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_delete_with_directory_components_clears_selection() {
        let dir = tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path().to_path_buf());
        let state: SharedState = Arc::new(SidecarState::open(config).await.unwrap());

        let model = state.store.models_dir().join("x.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let model_str = model.to_string_lossy().to_string();
        state.settings.update_model_path(Some(model_str.as_str())).await;

        let params = ModelNameParams { name: "../x.gguf".to_string() };
        handle_delete_model(state.clone(), params).await.unwrap();

        assert!(!model.exists());
        assert_eq!(state.settings.snapshot().await.model_path, None);
    }
}
