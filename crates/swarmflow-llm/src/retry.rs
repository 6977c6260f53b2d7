use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use swarmflow_core::config::RetryConfig;
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::traits::ModelClient;
use swarmflow_core::types::{ModelRequest, ModelResponse};

/// A model client that retries transient failures with exponential backoff.
///
/// The retry budget comes from each request's `max_retries`, so per-agent
/// overrides apply without rebuilding the client.
pub struct RetryingClient {
    inner: Box<dyn ModelClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn ModelClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &SwarmError) -> bool {
    match e {
        SwarmError::ModelRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        SwarmError::ModelTimeout { .. } => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ModelClient for RetryingClient {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            let max_retries = request.max_retries.unwrap_or(0);

            let mut attempt = 0;
            loop {
                match self.inner.complete(request.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying model request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct FlakyClient {
        failures: Mutex<Vec<SwarmError>>,
        calls: Arc<AtomicUsize>,
    }

    impl ModelClient for FlakyClient {
        fn complete(&self, _request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let next = self.failures.lock().unwrap().pop();
                match next {
                    Some(e) => Err(e),
                    None => Ok(ModelResponse::text("ok")),
                }
            })
        }
    }

    fn request(max_retries: Option<u32>) -> ModelRequest {
        ModelRequest {
            system_prompt: String::new(),
            messages: vec![],
            tools: vec![],
            model: "test-model".into(),
            timeout: None,
            max_retries,
        }
    }

    fn client(failures: Vec<SwarmError>) -> (RetryingClient, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = FlakyClient {
            failures: Mutex::new(failures),
            calls: calls.clone(),
        };
        let config = RetryConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        };
        (RetryingClient::new(Box::new(inner), config), calls)
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&SwarmError::ModelRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&SwarmError::ModelTimeout { timeout_secs: 5 }));
        assert!(!is_retryable(&SwarmError::ModelRequest("HTTP 401 Unauthorized".into())));
        assert!(!is_retryable(&SwarmError::ModelParse("bad json".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let backoff = calculate_backoff(10, &config);
        assert!(backoff <= Duration::from_millis(6000));
        assert!(backoff >= Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let (client, calls) = client(vec![
            SwarmError::ModelRequest("HTTP 503".into()),
            SwarmError::ModelRequest("HTTP 500".into()),
        ]);
        let resp = client.complete(request(Some(3))).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let (client, calls) = client(vec![
            SwarmError::ModelRequest("HTTP 503".into()),
            SwarmError::ModelRequest("HTTP 503".into()),
        ]);
        let err = client.complete(request(Some(1))).await.unwrap_err();
        assert!(matches!(err, SwarmError::ModelRequest(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let (client, calls) = client(vec![SwarmError::ModelRequest("HTTP 401".into())]);
        assert!(client.complete(request(Some(5))).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
