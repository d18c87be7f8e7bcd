//! Provider construction from configuration.

use std::sync::Arc;

use stepwise_core::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
pub fn build_from_config(config: &stepwise_config::AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_else(|| {
        // Local servers accept any bearer token
        config.provider.clone()
    });
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    Arc::new(OpenAiCompatProvider::new(&config.provider, base_url, api_key))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "http://localhost:11434/v1".into(),
    }
}
