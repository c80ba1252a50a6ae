//! Model Registry - curated models and file naming for downloads

use once_cell::sync::Lazy;

use super::types::{RepositoryLink, StandardModel};

fn link(label: &str) -> RepositoryLink {
    RepositoryLink {
        label: label.to_string(),
        url: format!("https://huggingface.co/{}", label),
    }
}

fn model(name: &str, size_label: &str, description: &str, download_url: &str, repos: &[&str]) -> StandardModel {
    StandardModel {
        name: name.to_string(),
        size_label: size_label.to_string(),
        description: description.to_string(),
        download_url: download_url.to_string(),
        repository_links: repos.iter().map(|r| link(r)).collect(),
    }
}

static STANDARD_MODELS: Lazy<Vec<StandardModel>> = Lazy::new(|| {
    vec![
        model(
            "Llama-3.2-3B Instruct",
            "~2 GB (Q4) to ~3.4 GB (Q8)",
            "Instruct build of Llama 3.2 with many quantizations that suit phones.",
            "https://huggingface.co/bartowski/Llama-3.2-3B-Instruct-GGUF/resolve/main/Llama-3.2-3B-Instruct-Q4_K_M.gguf?download=true",
            &["bartowski/Llama-3.2-3B-Instruct-GGUF", "hugging-quants/Llama-3.2-3B-Instruct-Q4_K_M-GGUF"],
        ),
        model(
            "Llama-3.2-1B Instruct",
            "< 1 GB to ~1.3 GB depending on quant",
            "Lighter Llama 3.2 variant for devices with limited memory.",
            "https://huggingface.co/bartowski/Llama-3.2-1B-Instruct-GGUF/resolve/main/Llama-3.2-1B-Instruct-Q4_K_M.gguf?download=true",
            &["bartowski/Llama-3.2-1B-Instruct-GGUF"],
        ),
        model(
            "Phi-3 Mini 4K Instruct",
            "~2-4 GB depending on quant",
            "Small model with solid instruction following and reasoning.",
            "https://huggingface.co/microsoft/Phi-3-mini-4k-instruct-gguf/resolve/main/Phi-3-mini-4k-instruct-q4.gguf?download=true",
            &["microsoft/Phi-3-mini-4k-instruct-gguf", "LiteLLMs/Phi-3-mini-4k-instruct-GGUF"],
        ),
        model(
            "Phi-4 Mini Instruct",
            "~2-3 GB",
            "Newest member of the Phi family.",
            "https://huggingface.co/unsloth/Phi-4-mini-instruct-GGUF/resolve/main/Phi-4-mini-instruct-Q4_K_M.gguf?download=true",
            &[
                "unsloth/Phi-4-mini-instruct-GGUF",
                "tensorblock/Phi-4-mini-instruct-GGUF",
                "lmstudio-community/Phi-4-mini-instruct-GGUF",
            ],
        ),
        model(
            "Dolphin3.0 Llama3.2-3B",
            "~2 GB (Q4), larger variants available",
            "Llama 3.2 fine-tune to try when the main variant does not fit the task.",
            "https://huggingface.co/bartowski/Dolphin3.0-Llama3.2-3B-GGUF/resolve/main/Dolphin3.0-Llama3.2-3B-Q4_K_M.gguf?download=true",
            &["bartowski/Dolphin3.0-Llama3.2-3B-GGUF"],
        ),
        model(
            "Hermes-3 Llama3.2-3B",
            "~3B params",
            "Llama 3.2 variant tuned for reasoning and agent use.",
            "https://huggingface.co/NousResearch/Hermes-3-Llama-3.2-3B-GGUF/resolve/main/Hermes-3-Llama-3.2-3B.Q4_K_M.gguf?download=true",
            &["NousResearch/Hermes-3-Llama-3.2-3B-GGUF"],
        ),
    ]
});

/// Get list of curated models for download
pub fn standard_models() -> &'static [StandardModel] {
    &STANDARD_MODELS
}

pub fn find_standard_model(name: &str) -> Option<&'static StandardModel> {
    STANDARD_MODELS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// File name a download from `url` is stored under: the last non-blank path
/// segment, or `model-<unix millis>` when the URL has none.
pub fn resolve_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.trim().is_empty()).last().map(str::to_string))
        })
        .unwrap_or_else(|| format!("model-{}", chrono::Utc::now().timestamp_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_file_name_uses_last_segment() {
        let url = &standard_models()[0].download_url;
        assert_eq!(resolve_file_name(url), "Llama-3.2-3B-Instruct-Q4_K_M.gguf");
        assert_eq!(resolve_file_name("https://example.com/models/tiny.gguf/"), "tiny.gguf");
    }

    #[test]
    fn test_resolve_file_name_synthesizes_when_missing() {
        assert!(resolve_file_name("https://example.com/").starts_with("model-"));
        assert!(resolve_file_name("not a url").starts_with("model-"));
    }

    #[test]
    fn test_catalog_urls_are_https() {
        assert!(!standard_models().is_empty());
        for m in standard_models() {
            assert!(m.download_url.starts_with("https://"));
            assert!(!m.repository_links.is_empty());
        }
        assert!(find_standard_model("phi-4 mini instruct").is_some());
    }
}
