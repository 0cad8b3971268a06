//! Provider selection: builds the configured text-generation backend.

use std::sync::Arc;
use std::time::Duration;
use cpmagent_config::ModelConfig;
use cpmagent_core::error::ProviderError;
use cpmagent_core::provider::Provider;
use tracing::info;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider named by `model.provider`.
///
/// `"local"` requires the `local` feature; every other name is treated as an
/// OpenAI-compatible endpoint, with a default base URL for well-known ones.
pub fn build_provider(config: &ModelConfig, request_timeout: Duration) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.as_str();

    if name == "local" {
        return build_local(config);
    }

    let base_url = match (&config.api_url, default_base_url(name)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' needs model.api_url"
            )));
        }
    };

    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() && requires_api_key(name) {
        return Err(ProviderError::NotConfigured(format!(
            "provider '{name}' needs an API key (model.api_key or CPMAGENT_API_KEY)"
        )));
    }

    info!(provider = name, base_url = %base_url, model = %config.name, "Using OpenAI-compatible provider");
    Ok(Arc::new(
        OpenAiCompatProvider::new(name, base_url, api_key).with_timeout(request_timeout),
    ))
}

#[cfg(feature = "local")]
fn build_local(config: &ModelConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    info!(repo = %config.name, device = %config.device, "Using in-process provider");
    Ok(Arc::new(crate::local::LocalProvider::from_config(config)))
}

#[cfg(not(feature = "local"))]
fn build_local(_config: &ModelConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    Err(ProviderError::NotConfigured(
        "provider 'local' requires building with the `local` feature".into(),
    ))
}

fn requires_api_key(provider_name: &str) -> bool {
    matches!(provider_name, "openai" | "openrouter")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "llamacpp" | "llama.cpp" => Some("http://localhost:8080/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        _ => None,
    }
}
