use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use switchboard_core::config::{ModelConfig, RetryConfig};
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::{LlmClient, ModelRequest};
use switchboard_core::types::AgentResponse;

/// An LLM client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &SwitchboardError) -> bool {
    match e {
        SwitchboardError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn invoke(&self, config: &ModelConfig, request: ModelRequest) -> BoxFuture<'_, Result<AgentResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.invoke(&config, request.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.invoke(fb_config, request.clone()).await {
                    Ok(response) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(response);
                    }
                    Err(e) => {
                        warn!(
                            model = %fb_config.model_id,
                            error = %e,
                            "Fallback model also failed"
                        );
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| SwitchboardError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        failures: usize,
        error: fn() -> SwitchboardError,
        calls: Arc<AtomicUsize>,
    }

    impl LlmClient for Flaky {
        fn invoke(&self, _config: &ModelConfig, _request: ModelRequest) -> BoxFuture<'_, Result<AgentResponse>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    Err((self.error)())
                } else {
                    Ok(AgentResponse::text("ok"))
                }
            })
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(6000));
        assert!(d >= Duration::from_millis(4000));
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(is_retryable(&SwitchboardError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(!is_retryable(&SwitchboardError::LlmRequest("HTTP 401 Unauthorized".into())));
        assert!(!is_retryable(&SwitchboardError::LlmParse("bad".into())));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: 2,
                error: || SwitchboardError::LlmRequest("HTTP 503".into()),
                calls: calls.clone(),
            }),
            vec![],
            fast_retry(3),
        );
        let response = client
            .invoke(&ModelConfig::new("openai", "m"), request())
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn falls_back_after_fatal_error() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                error: || SwitchboardError::LlmRequest("HTTP 401".into()),
                calls: primary_calls.clone(),
            }),
            vec![(
                ModelConfig::new("openai", "backup"),
                Box::new(Flaky {
                    failures: 0,
                    error: || SwitchboardError::LlmRequest("unused".into()),
                    calls: fallback_calls.clone(),
                }) as Box<dyn LlmClient>,
            )],
            fast_retry(3),
        );
        assert!(client
            .invoke(&ModelConfig::new("openai", "m"), request())
            .await
            .is_ok());
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }
}
