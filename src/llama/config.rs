//! Runtime and sampling configuration handed to the inference engine
//!
//! `None` on any optional field means "keep the engine default".

use serde::{Deserialize, Serialize};

/// Configuration used when a model session is initialised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub thread_count: i32,
    pub context_size: i32,
    pub thread_count_batch: Option<i32>,
    pub batch_size: Option<i32>,
    pub ubatch_size: Option<i32>,
    pub seq_max: Option<i32>,
    pub n_gpu_layers: Option<i32>,
    pub main_gpu: Option<i32>,
    /// -1 = auto, 0 = off, 1 = on
    pub flash_attention: Option<i32>,
    pub rope_freq_base: Option<f32>,
    pub rope_freq_scale: Option<f32>,
    pub offload_kqv: Option<bool>,
    pub no_perf: Option<bool>,
    pub embeddings: Option<bool>,
    pub kv_unified: Option<bool>,
    pub use_mmap: Option<bool>,
    pub use_mlock: Option<bool>,
}

impl RuntimeConfig {
    /// Config with only the two mandatory knobs set, clamped to at least 1
    pub fn with_defaults(thread_count: i32, context_size: i32) -> Self {
        Self {
            thread_count: thread_count.max(1),
            context_size: context_size.max(1),
            thread_count_batch: None,
            batch_size: None,
            ubatch_size: None,
            seq_max: None,
            n_gpu_layers: None,
            main_gpu: None,
            flash_attention: None,
            rope_freq_base: None,
            rope_freq_scale: None,
            offload_kqv: None,
            no_perf: None,
            embeddings: None,
            kv_unified: None,
            use_mmap: None,
            use_mlock: None,
        }
    }

    /// Clamp the mandatory counts to 1 and drop optional values that fail
    /// their own validity check.
    pub fn sanitized(&self) -> Self {
        Self {
            thread_count: self.thread_count.max(1),
            context_size: self.context_size.max(1),
            thread_count_batch: self.thread_count_batch.filter(|v| *v > 0),
            batch_size: self.batch_size.filter(|v| *v > 0),
            ubatch_size: self.ubatch_size.filter(|v| *v > 0),
            seq_max: self.seq_max.filter(|v| *v > 0),
            n_gpu_layers: self.n_gpu_layers.filter(|v| *v >= 0),
            main_gpu: self.main_gpu.filter(|v| *v >= 0),
            flash_attention: self.flash_attention.filter(|v| (-1..=1).contains(v)),
            rope_freq_base: self.rope_freq_base.filter(|v| v.is_finite() && *v > 0.0),
            rope_freq_scale: self.rope_freq_scale.filter(|v| v.is_finite() && *v > 0.0),
            ..self.clone()
        }
    }
}

/// Generation hyper-parameters for a single completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub max_tokens: i32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<i32>,
    pub repeat_penalty: Option<f32>,
    pub repeat_last_n: Option<i32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop_sequences: Vec<String>,
    pub seed: Option<i32>,
}

impl SamplingConfig {
    pub fn with_defaults(max_tokens: i32) -> Self {
        Self {
            max_tokens: max_tokens.max(0),
            temperature: None,
            top_p: None,
            top_k: None,
            repeat_penalty: None,
            repeat_last_n: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: Vec::new(),
            seed: None,
        }
    }

    /// Clamp `max_tokens` to 0 and drop every other field that fails its check.
    pub fn sanitized(&self) -> Self {
        Self {
            max_tokens: self.max_tokens.max(0),
            temperature: self.temperature.filter(|v| v.is_finite() && *v > 0.0),
            top_p: self.top_p.filter(|v| v.is_finite() && (0.0..=1.0).contains(v)),
            top_k: self.top_k.filter(|v| *v > 0),
            repeat_penalty: self.repeat_penalty.filter(|v| v.is_finite() && *v > 0.0),
            repeat_last_n: self.repeat_last_n.filter(|v| *v >= 0),
            frequency_penalty: self.frequency_penalty.filter(|v| v.is_finite()),
            presence_penalty: self.presence_penalty.filter(|v| v.is_finite()),
            stop_sequences: self
                .stop_sequences
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            seed: self.seed.filter(|v| *v >= 0),
        }
    }
}
