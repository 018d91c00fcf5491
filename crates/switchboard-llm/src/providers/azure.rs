use futures::future::BoxFuture;
use reqwest::Client;
use switchboard_core::config::ModelConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::{LlmClient, ModelRequest};
use switchboard_core::types::AgentResponse;

/// Azure OpenAI client. Uses the same wire format as OpenAI but different
/// endpoint structure and `api-key` header instead of Bearer token.
pub struct AzureClient {
    http: Client,
}

impl AzureClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AzureClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Deployment URL for a config. `base_url` is the resource endpoint.
pub(crate) fn deployment_url(config: &ModelConfig) -> Result<String> {
    let endpoint = config
        .base_url
        .as_deref()
        .ok_or_else(|| SwitchboardError::Config("Azure: base_url (resource endpoint) is required".into()))?;
    let deployment = config
        .azure_deployment
        .as_deref()
        .unwrap_or(config.model_id.as_str());
    Ok(format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        config.azure_api_version
    ))
}

impl LlmClient for AzureClient {
    fn invoke(&self, config: &ModelConfig, request: ModelRequest) -> BoxFuture<'_, Result<AgentResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let url = deployment_url(&config)?;
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| SwitchboardError::Config("Azure: api_key is required".into()))?;

            // The deployment fixes the model, so the body omits it.
            let body = super::openai::build_request(&config, &request, false);

            let response = self
                .http
                .post(&url)
                .header("api-key", api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| SwitchboardError::LlmRequest(e.to_string()))?;

            super::openai::read_response(response).await
        })
    }
}
