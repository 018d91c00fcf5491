pub mod providers;
pub mod retry;

use switchboard_core::config::{AppConfig, ModelConfig};
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::LlmClient;

pub use providers::azure::AzureClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "azure" | "azure_openai" => Ok(Box::new(AzureClient::new())),
        // OpenAI-compatible servers (vLLM, Ollama, Groq) share the wire format.
        "openai" | "openai_compatible" | "ollama" | "vllm" | "groq" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(SwitchboardError::UnsupportedProvider(other.to_string())),
    }
}

/// Build the primary client wrapped with retry and the configured fallbacks.
pub fn client_from_config(config: &AppConfig) -> Result<RetryingClient> {
    let primary = create_client(&config.model)?;
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| create_client(fb).map(|client| (fb.clone(), client)))
        .collect::<Result<Vec<_>>>()?;
    let retry = config.model.retry.clone().unwrap_or_default();
    Ok(RetryingClient::new(primary, fallbacks, retry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_resolve() {
        assert!(create_client(&ModelConfig::new("openai", "gpt-4o")).is_ok());
        assert!(create_client(&ModelConfig::new("azure", "gpt-4o")).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = create_client(&ModelConfig::new("carrier-pigeon", "x")).err();
        assert!(matches!(err, Some(SwitchboardError::UnsupportedProvider(p)) if p == "carrier-pigeon"));
    }
}
