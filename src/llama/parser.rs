//! Turns the loosely structured runtime/sampling setting strings into typed configs
//!
//! Settings are normally JSON objects, but older installs stored free-form
//! notes in the same fields. Anything that is not a JSON object degrades to
//! the fallback config instead of failing.

use serde_json::{Map, Value};

use super::config::{RuntimeConfig, SamplingConfig};

/// Why a parse fell back to the default config
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Empty,
    NotAnObject,
    Malformed(String),
}

/// Result of parsing a settings string
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    /// The text was a JSON object; recognized keys were applied
    Recognized(T),
    /// The text was unusable; the default config is returned instead
    Fallback { config: T, reason: FallbackReason },
}

impl<T> ParseOutcome<T> {
    pub fn into_config(self) -> T {
        match self {
            ParseOutcome::Recognized(config) => config,
            ParseOutcome::Fallback { config, .. } => config,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, ParseOutcome::Recognized(_))
    }
}

const THREAD_KEYS: &[&str] = &["threads", "thread_count", "n_threads"];
const THREAD_INFERENCE_KEYS: &[&str] = &["inference", "decode", "eval", "generation"];
const THREAD_BATCH_KEYS: &[&str] = &["batch", "batch_eval", "thread_count_batch"];
const CONTEXT_KEYS: &[&str] = &["context", "context_size", "n_ctx", "ctx"];
const BATCH_KEYS: &[&str] = &["batch", "n_batch"];
const UBATCH_KEYS: &[&str] = &["ubatch", "n_ubatch"];
const SEQ_MAX_KEYS: &[&str] = &["seq_max", "n_seq_max"];
const GPU_LAYER_KEYS: &[&str] = &["n_gpu_layers", "gpu_layers"];
const FLASH_ATTENTION_KEYS: &[&str] = &["flash_attn", "flash_attention"];

const MAX_TOKEN_KEYS: &[&str] = &["max_tokens", "max_new_tokens"];
const TEMPERATURE_KEYS: &[&str] = &["temperature", "temp"];
const REPEAT_PENALTY_KEYS: &[&str] = &["repeat_penalty", "presence_penalty_scale"];
const STOP_KEYS: &[&str] = &["stop_sequences", "stop", "stops"];

/// Parse a runtime settings string, always returning a sanitized config.
pub fn parse_runtime_config(raw: &str, fallback_threads: i32, fallback_context: i32) -> RuntimeConfig {
    let outcome = parse_runtime_config_outcome(raw, fallback_threads, fallback_context);
    if let ParseOutcome::Fallback { reason, .. } = &outcome {
        log::debug!("Runtime settings fell back to defaults: {:?}", reason);
    }
    outcome.into_config()
}

pub fn parse_runtime_config_outcome(
    raw: &str,
    fallback_threads: i32,
    fallback_context: i32,
) -> ParseOutcome<RuntimeConfig> {
    let default_config = RuntimeConfig::with_defaults(fallback_threads, fallback_context).sanitized();
    match json_object(raw) {
        Ok(json) => ParseOutcome::Recognized(
            runtime_from_json(&json, fallback_threads, fallback_context).sanitized(),
        ),
        Err(reason) => ParseOutcome::Fallback { config: default_config, reason },
    }
}

/// Parse a sampling settings string, always returning a sanitized config.
pub fn parse_sampling_config(raw: &str, default_max_tokens: i32) -> SamplingConfig {
    let outcome = parse_sampling_config_outcome(raw, default_max_tokens);
    if let ParseOutcome::Fallback { reason, .. } = &outcome {
        log::debug!("Sampling settings fell back to defaults: {:?}", reason);
    }
    outcome.into_config()
}

pub fn parse_sampling_config_outcome(raw: &str, default_max_tokens: i32) -> ParseOutcome<SamplingConfig> {
    let default_config = SamplingConfig::with_defaults(default_max_tokens).sanitized();
    match json_object(raw) {
        Ok(json) => ParseOutcome::Recognized(sampling_from_json(&json, default_max_tokens).sanitized()),
        Err(reason) => ParseOutcome::Fallback { config: default_config, reason },
    }
}

fn json_object(raw: &str) -> Result<Map<String, Value>, FallbackReason> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Err(FallbackReason::Empty);
    }
    if !candidate.starts_with('{') {
        return Err(FallbackReason::NotAnObject);
    }
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FallbackReason::NotAnObject),
        Err(e) => Err(FallbackReason::Malformed(e.to_string())),
    }
}

fn runtime_from_json(json: &Map<String, Value>, fallback_threads: i32, fallback_context: i32) -> RuntimeConfig {
    let (thread_count, thread_count_batch) = parse_thread_counts(first_present(json, THREAD_KEYS), fallback_threads);

    RuntimeConfig {
        thread_count,
        context_size: extract_int(json, CONTEXT_KEYS).unwrap_or(fallback_context),
        thread_count_batch,
        batch_size: extract_int(json, BATCH_KEYS),
        ubatch_size: extract_int(json, UBATCH_KEYS),
        seq_max: extract_int(json, SEQ_MAX_KEYS),
        n_gpu_layers: extract_int(json, GPU_LAYER_KEYS),
        main_gpu: extract_int(json, &["main_gpu"]),
        flash_attention: first_present(json, FLASH_ATTENTION_KEYS).and_then(extract_flash_attention),
        rope_freq_base: extract_float(json, &["rope_freq_base"]),
        rope_freq_scale: extract_float(json, &["rope_freq_scale"]),
        offload_kqv: extract_bool(json, &["offload_kqv"]),
        no_perf: extract_bool(json, &["no_perf"]),
        embeddings: extract_bool(json, &["embeddings"]),
        kv_unified: extract_bool(json, &["kv_unified"]),
        use_mmap: extract_bool(json, &["use_mmap"]),
        use_mlock: extract_bool(json, &["use_mlock"]),
    }
}

fn sampling_from_json(json: &Map<String, Value>, default_max_tokens: i32) -> SamplingConfig {
    let stop_sequences = match first_present(json, STOP_KEYS) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    SamplingConfig {
        max_tokens: extract_int(json, MAX_TOKEN_KEYS).unwrap_or(default_max_tokens),
        temperature: extract_float(json, TEMPERATURE_KEYS),
        top_p: extract_float(json, &["top_p"]),
        top_k: extract_int(json, &["top_k"]),
        repeat_penalty: extract_float(json, REPEAT_PENALTY_KEYS),
        repeat_last_n: extract_int(json, &["repeat_last_n"]),
        frequency_penalty: extract_float(json, &["frequency_penalty"]),
        presence_penalty: extract_float(json, &["presence_penalty"]),
        stop_sequences,
        seed: extract_int(json, &["seed"]),
    }
}

/// Thread count may be a number, a numeric string, "auto", or an object
/// splitting inference and batch threads.
fn parse_thread_counts(value: Option<&Value>, fallback_threads: i32) -> (i32, Option<i32>) {
    let fallback = fallback_threads.max(1);
    match value {
        Some(Value::Number(n)) => (number_to_i32(n).map(|v| v.max(1)).unwrap_or(fallback), None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
                (fallback, None)
            } else {
                (trimmed.parse::<i32>().ok().filter(|v| *v > 0).unwrap_or(fallback), None)
            }
        }
        Some(Value::Object(split)) => {
            let inference = extract_int(split, THREAD_INFERENCE_KEYS).unwrap_or(fallback_threads);
            let batch = extract_int(split, THREAD_BATCH_KEYS).filter(|v| *v > 0);
            (inference.max(1), batch)
        }
        _ => (fallback, None),
    }
}

fn first_present<'a>(json: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| json.get(*key))
        .find(|value| !value.is_null())
}

fn number_to_i32(n: &serde_json::Number) -> Option<i32> {
    if let Some(v) = n.as_i64() {
        return i32::try_from(v).ok();
    }
    n.as_f64()
        .filter(|v| v.is_finite() && *v >= i32::MIN as f64 && *v <= i32::MAX as f64)
        .map(|v| v.trunc() as i32)
}

fn extract_int(json: &Map<String, Value>, keys: &[&str]) -> Option<i32> {
    keys.iter().find_map(|key| match json.get(*key)? {
        Value::Number(n) => number_to_i32(n),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    })
}

fn extract_float(json: &Map<String, Value>, keys: &[&str]) -> Option<f32> {
    keys.iter().find_map(|key| match json.get(*key)? {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    })
}

fn extract_bool(json: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match json.get(*key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => number_to_i32(n).map(|v| v != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "enabled" | "enable" => Some(true),
            "false" | "0" | "no" | "disabled" | "disable" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn extract_flash_attention(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => number_to_i32(n).filter(|v| (-1..=1).contains(v)),
        Value::Bool(b) => Some(if *b { 1 } else { 0 }),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "auto" => Some(-1),
            "enabled" | "enable" | "true" | "on" => Some(1),
            "disabled" | "disable" | "false" | "off" => Some(0),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_fallback_for_non_json() {
        let expected = RuntimeConfig::with_defaults(4, 2048).sanitized();
        assert_eq!(parse_runtime_config("not json", 4, 2048), expected);
        assert_eq!(parse_runtime_config("", 4, 2048), expected);
        assert_eq!(parse_runtime_config("   ", 4, 2048), expected);
    }

    #[test]
    fn test_runtime_malformed_json_degrades() {
        let outcome = parse_runtime_config_outcome("{\"threads\": ", 2, 512);
        match outcome {
            ParseOutcome::Fallback { config, reason } => {
                assert_eq!(config, RuntimeConfig::with_defaults(2, 512));
                assert!(matches!(reason, FallbackReason::Malformed(_)));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_runtime_recognized_keys() {
        let raw = r#"{
            "n_threads": "6",
            "n_ctx": 4096,
            "n_batch": 256,
            "ubatch": 128,
            "n_seq_max": 2,
            "gpu_layers": 33,
            "main_gpu": 0,
            "flash_attention": "auto",
            "rope_freq_base": "10000.5",
            "rope_freq_scale": 0.25,
            "offload_kqv": "yes",
            "no_perf": 1,
            "embeddings": false,
            "kv_unified": "disabled",
            "use_mmap": true,
            "use_mlock": "maybe"
        }"#;
        let outcome = parse_runtime_config_outcome(raw, 1, 1);
        assert!(outcome.is_recognized());
        let cfg = outcome.into_config();
        assert_eq!(cfg.thread_count, 6);
        assert_eq!(cfg.context_size, 4096);
        assert_eq!(cfg.batch_size, Some(256));
        assert_eq!(cfg.ubatch_size, Some(128));
        assert_eq!(cfg.seq_max, Some(2));
        assert_eq!(cfg.n_gpu_layers, Some(33));
        assert_eq!(cfg.main_gpu, Some(0));
        assert_eq!(cfg.flash_attention, Some(-1));
        assert_eq!(cfg.rope_freq_base, Some(10000.5));
        assert_eq!(cfg.rope_freq_scale, Some(0.25));
        assert_eq!(cfg.offload_kqv, Some(true));
        assert_eq!(cfg.no_perf, Some(true));
        assert_eq!(cfg.embeddings, Some(false));
        assert_eq!(cfg.kv_unified, Some(false));
        assert_eq!(cfg.use_mmap, Some(true));
        assert_eq!(cfg.use_mlock, None);
    }

    #[test]
    fn test_thread_variants() {
        assert_eq!(parse_runtime_config(r#"{"threads": "auto"}"#, 8, 512).thread_count, 8);
        assert_eq!(parse_runtime_config(r#"{"threads": 0}"#, 8, 512).thread_count, 1);
        assert_eq!(parse_runtime_config(r#"{"threads": "-2"}"#, 8, 512).thread_count, 8);

        let split = parse_runtime_config(r#"{"threads": {"decode": 3, "batch_eval": 5}}"#, 8, 512);
        assert_eq!(split.thread_count, 3);
        assert_eq!(split.thread_count_batch, Some(5));

        let split = parse_runtime_config(r#"{"threads": {"batch": 0}}"#, 8, 512);
        assert_eq!(split.thread_count, 8);
        assert_eq!(split.thread_count_batch, None);
    }

    #[test]
    fn test_runtime_invalid_optionals_dropped_not_clamped() {
        let cfg = parse_runtime_config(r#"{"n_gpu_layers": -1, "context": -50, "flash_attn": 7}"#, 2, 512);
        assert_eq!(cfg.n_gpu_layers, None);
        assert_eq!(cfg.context_size, 1);
        assert_eq!(cfg.flash_attention, None);
    }

    #[test]
    fn test_sampling_aliases_and_stops() {
        let cfg = parse_sampling_config(
            r#"{"max_new_tokens": 300, "temp": "0.8", "top_p": 0.9, "top_k": 40,
                "presence_penalty_scale": 1.1, "repeat_last_n": 64, "seed": 7,
                "stop": ["</s>", "", "User:"]}"#,
            128,
        );
        assert_eq!(cfg.max_tokens, 300);
        assert_eq!(cfg.temperature, Some(0.8));
        assert_eq!(cfg.top_p, Some(0.9));
        assert_eq!(cfg.top_k, Some(40));
        assert_eq!(cfg.repeat_penalty, Some(1.1));
        assert_eq!(cfg.repeat_last_n, Some(64));
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.stop_sequences, vec!["</s>".to_string(), "User:".to_string()]);
    }

    #[test]
    fn test_sampling_single_stop_string_and_defaults() {
        let cfg = parse_sampling_config("{\"stops\": \"###\", \"temperature\": -1}", 128);
        assert_eq!(cfg.max_tokens, 128);
        assert_eq!(cfg.temperature, None);
        assert_eq!(cfg.stop_sequences, vec!["###".to_string()]);

        let cfg = parse_sampling_config("be creative please", 64);
        assert_eq!(cfg, SamplingConfig::with_defaults(64));
    }

    #[test]
    fn test_first_alias_with_value_wins() {
        let cfg = parse_sampling_config(r#"{"max_tokens": "lots", "max_new_tokens": 42}"#, 10);
        assert_eq!(cfg.max_tokens, 42);
    }

    #[test]
    fn test_json_array_is_not_a_config() {
        let outcome = parse_sampling_config_outcome("[1, 2]", 10);
        assert!(matches!(
            outcome,
            ParseOutcome::Fallback { reason: FallbackReason::NotAnObject, .. }
        ));
    }
}
