//! Keeps prompt + generation inside the model's context window

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_TOKEN_FRACTION: f64 = 0.5;
const MIN_DEFAULT_MAX_TOKENS: i32 = 16;
const AVERAGE_CHARS_PER_TOKEN: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub prompt_tokens: i32,
    pub remaining_tokens: i32,
    pub max_tokens: i32,
}

/// Half the context window, at least 16 and never more than the window.
pub fn derive_default_max_tokens(context_size: i32) -> i32 {
    if context_size <= 0 {
        return 0;
    }
    let scaled = (context_size as f64 * DEFAULT_MAX_TOKEN_FRACTION).round() as i32;
    scaled.max(MIN_DEFAULT_MAX_TOKENS).min(context_size)
}

/// Conservative prompt cost: the larger of the word count and chars / 4.
pub fn estimate_prompt_tokens(prompt: &str) -> i32 {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return 0;
    }
    let word_estimate = trimmed.split_whitespace().count() as f64;
    let char_estimate = (trimmed.chars().count() as f64 / AVERAGE_CHARS_PER_TOKEN).ceil();
    word_estimate.max(char_estimate).min(i32::MAX as f64) as i32
}

pub fn compute_token_budget(prompt: &str, context_size: i32, configured_max_tokens: i32) -> TokenBudget {
    let prompt_tokens = estimate_prompt_tokens(prompt);
    let remaining_tokens = context_size.max(0).saturating_sub(prompt_tokens).max(0);
    TokenBudget {
        prompt_tokens,
        remaining_tokens,
        max_tokens: remaining_tokens.min(configured_max_tokens.max(0)),
    }
}
